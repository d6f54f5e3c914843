//! Request Interceptor
//!
//! Fire-and-forget: inbound body chunks go through a private tokenizer so
//! request-side selectors can observe them. Transformed bytes are dropped
//! and nothing waits on completion.

use std::rc::Rc;

use log::debug;

use super::selector::{RequestInfo, ResponseInfo, Selector, SelectorBinder};
use crate::streaming::Tokenizer;

pub struct RequestInterceptor {
    tokenizer: Box<dyn Tokenizer>,
    bytes_seen: usize,
    stopped: bool,
}

impl RequestInterceptor {
    pub fn new(mut tokenizer: Box<dyn Tokenizer>, selectors: &[Selector], request: Rc<RequestInfo>) -> Self {
        SelectorBinder::new(request, Rc::new(ResponseInfo::pending())).bind(tokenizer.as_mut(), selectors);

        Self {
            tokenizer,
            bytes_seen: 0,
            stopped: false,
        }
    }

    /// Forward one inbound chunk
    pub fn data(&mut self, chunk: &[u8]) {
        if self.stopped {
            return;
        }
        self.bytes_seen += chunk.len();

        if let Err(e) = self.tokenizer.write(chunk) {
            debug!("request tokenizer stopped after {} bytes: {}", self.bytes_seen, e);
            self.stopped = true;
        }
        self.discard_output();
    }

    /// The inbound stream ended; lets trailing matches fire
    pub fn end(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Err(e) = self.tokenizer.end() {
            debug!("request tokenizer failed at end: {}", e);
        }
        self.discard_output();
    }

    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen
    }

    fn discard_output(&mut self) {
        while self.tokenizer.read().is_some() {}
    }
}

/// Request half of an exchange
pub struct InterceptedRequest {
    info: Rc<RequestInfo>,
    interceptor: Option<RequestInterceptor>,
}

impl InterceptedRequest {
    pub fn new(info: Rc<RequestInfo>, interceptor: Option<RequestInterceptor>) -> Self {
        Self { info, interceptor }
    }

    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    pub fn is_intercepted(&self) -> bool {
        self.interceptor.is_some()
    }

    /// Inbound body chunk, as it arrives
    pub fn data(&mut self, chunk: &[u8]) {
        if let Some(interceptor) = self.interceptor.as_mut() {
            interceptor.data(chunk);
        }
    }

    pub fn end(&mut self) {
        if let Some(interceptor) = self.interceptor.as_mut() {
            interceptor.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::HtmlTokenizer;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_request_selectors_observe_body() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let selectors = vec![Selector::new("input[name]", move |el, req, res| {
            assert!(res.status.is_none());
            let name = el.get_attribute("name").unwrap_or_default();
            sink.lock().unwrap().push(format!("{} {}", req.method, name));
        })
        .unwrap()];

        let info = Rc::new(RequestInfo::new("POST", "/submit"));
        let mut interceptor = RequestInterceptor::new(Box::new(HtmlTokenizer::new()), &selectors, info);

        interceptor.data(b"<form><input name=\"us");
        interceptor.data(b"er\"><input name=\"pass\"></form>");
        interceptor.end();

        assert_eq!(*seen.lock().unwrap(), vec!["POST user", "POST pass"]);
        assert_eq!(interceptor.bytes_seen(), 51);
    }

    #[test]
    fn test_data_after_end_ignored() {
        let info = Rc::new(RequestInfo::new("POST", "/"));
        let mut interceptor = RequestInterceptor::new(Box::new(HtmlTokenizer::new()), &[], info);

        interceptor.data(b"<p>");
        interceptor.end();
        interceptor.data(b"late");
        interceptor.end();

        assert_eq!(interceptor.bytes_seen(), 3);
    }

    #[test]
    fn test_unintercepted_request_is_inert() {
        let mut request = InterceptedRequest::new(Rc::new(RequestInfo::new("GET", "/x")), None);
        request.data(b"ignored");
        request.end();

        assert!(!request.is_intercepted());
        assert_eq!(request.info().url, "/x");
    }
}
