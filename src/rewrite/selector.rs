//! Selectors and Selector Binding
//!
//! A selector pairs a query with a callback. Binding closes each callback
//! over the request/response pair of one exchange, producing one
//! `BoundSelector` value per registration.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use lol_html::html_content::Element;
use lol_html::Selector as QuerySelector;

use super::sink::{header_value, remove_header, HeaderList, ResponseHead};
use crate::streaming::{Tokenizer, TokenizerError};

/// Callback invoked once per matching element, in document order
pub type SelectorCallback =
    Arc<dyn Fn(&mut Element<'_, '_>, &RequestInfo, &ResponseInfo) + Send + Sync>;

/// A query plus the callback fired for every element it matches
#[derive(Clone)]
pub struct Selector {
    query: String,
    callback: SelectorCallback,
}

impl Selector {
    /// Create a selector. The query is compiled once here so that later
    /// registration against a tokenizer cannot fail.
    pub fn new<F>(query: &str, callback: F) -> Result<Self, TokenizerError>
    where
        F: Fn(&mut Element<'_, '_>, &RequestInfo, &ResponseInfo) + Send + Sync + 'static,
    {
        query
            .parse::<QuerySelector>()
            .map_err(|e| TokenizerError::InvalidSelector {
                query: query.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            query: query.to_string(),
            callback: Arc::new(callback),
        })
    }

    /// The selector query
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector").field("query", &self.query).finish()
    }
}

/// Request snapshot handed to selector callbacks
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
}

impl RequestInfo {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Response snapshot handed to selector callbacks.
///
/// Request-side selectors run before a head exists, so `status` is `None` there.
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    pub status: Option<u16>,
    pub headers: HeaderList,
}

impl ResponseInfo {
    /// No head written yet
    pub fn pending() -> Self {
        Self::default()
    }

    /// Snapshot taken once the gate has adjusted the headers: the sink's
    /// live headers, overridden by those passed positionally with the head
    pub fn from_head(head: &ResponseHead, mut live: HeaderList) -> Self {
        for (name, value) in head.headers.iter().flatten() {
            remove_header(&mut live, name);
            live.push((name.clone(), value.clone()));
        }

        Self {
            status: Some(head.status),
            headers: live,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// A selector closed over one exchange
#[derive(Clone)]
pub struct BoundSelector {
    query: String,
    callback: SelectorCallback,
    request: Rc<RequestInfo>,
    response: Rc<ResponseInfo>,
}

impl BoundSelector {
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fire the callback for a matched element
    pub fn invoke(&self, element: &mut Element<'_, '_>) {
        (self.callback)(element, &self.request, &self.response);
    }
}

impl fmt::Debug for BoundSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundSelector")
            .field("query", &self.query)
            .field("url", &self.request.url)
            .finish()
    }
}

/// Registers selectors against a tokenizer for one request/response pair
pub struct SelectorBinder {
    request: Rc<RequestInfo>,
    response: Rc<ResponseInfo>,
}

impl SelectorBinder {
    pub fn new(request: Rc<RequestInfo>, response: Rc<ResponseInfo>) -> Self {
        Self { request, response }
    }

    /// Register every selector, in order
    pub fn bind(&self, tokenizer: &mut dyn Tokenizer, selectors: &[Selector]) {
        for selector in selectors {
            tokenizer.select_all(BoundSelector {
                query: selector.query.clone(),
                callback: Arc::clone(&selector.callback),
                request: Rc::clone(&self.request),
                response: Rc::clone(&self.response),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::DrainState;

    #[derive(Default)]
    struct Recorder {
        bound: Vec<BoundSelector>,
    }

    impl Tokenizer for Recorder {
        fn select_all(&mut self, selector: BoundSelector) {
            self.bound.push(selector);
        }

        fn write(&mut self, _chunk: &[u8]) -> Result<(), TokenizerError> {
            Ok(())
        }

        fn end(&mut self) -> Result<(), TokenizerError> {
            Ok(())
        }

        fn read(&mut self) -> Option<Vec<u8>> {
            None
        }

        fn drain_state(&self) -> Result<DrainState, TokenizerError> {
            Ok(DrainState::default())
        }
    }

    #[test]
    fn test_invalid_query_rejected() {
        let result = Selector::new("div[", |_, _, _| {});
        assert!(matches!(result, Err(TokenizerError::InvalidSelector { .. })));
    }

    #[test]
    fn test_bind_preserves_order_and_context() {
        let selectors = vec![
            Selector::new("title", |_, _, _| {}).unwrap(),
            Selector::new("a[href]", |_, _, _| {}).unwrap(),
        ];
        let request = Rc::new(RequestInfo::new("GET", "/index.html"));
        let binder = SelectorBinder::new(Rc::clone(&request), Rc::new(ResponseInfo::pending()));

        let mut recorder = Recorder::default();
        binder.bind(&mut recorder, &selectors);

        let queries: Vec<&str> = recorder.bound.iter().map(|b| b.query()).collect();
        assert_eq!(queries, vec!["title", "a[href]"]);
        // every bound selector holds the same exchange, not a copy of a loop variable
        for bound in &recorder.bound {
            assert!(Rc::ptr_eq(&bound.request, &request));
        }
    }

    #[test]
    fn test_request_info_header_lookup() {
        let info = RequestInfo::new("POST", "/form").with_header("Content-Type", "text/html");
        assert_eq!(info.header("content-type"), Some("text/html"));
        assert_eq!(info.header("accept"), None);
    }

    #[test]
    fn test_response_info_from_head() {
        let head = ResponseHead::new(201).with_header("x-test", "1");
        let info = ResponseInfo::from_head(&head, Vec::new());
        assert_eq!(info.status, Some(201));
        assert_eq!(info.header("X-Test"), Some("1"));
    }

    #[test]
    fn test_response_info_merges_live_headers() {
        let live: HeaderList = vec![
            ("Content-Type".to_string(), "text/plain".to_string()),
            ("Cache-Control".to_string(), "no-store".to_string()),
        ];
        let head = ResponseHead::new(200).with_header("content-type", "text/html");

        let info = ResponseInfo::from_head(&head, live);
        assert_eq!(info.header("content-type"), Some("text/html"));
        assert_eq!(info.header("cache-control"), Some("no-store"));
        assert_eq!(info.headers.len(), 2);
    }
}
