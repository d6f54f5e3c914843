//! Envoy host binding
//!
//! Runs the rewrite middleware inside an Envoy proxy-wasm HTTP filter.
//! Response headers are edited through the header map; each response body
//! chunk is replaced with the transformed bytes produced for it.
//!
//! Envoy cannot emit body bytes after the final body callback, so a
//! response still draining at end of stream is force-closed there.

use std::cell::RefCell;

use log::{debug, info, warn};
use proxy_wasm::hostcalls;
use proxy_wasm::traits::{Context, HttpContext, RootContext};
use proxy_wasm::types::{Action, ContextType, LogLevel, MapType};

use crate::config::RewriteConfig;
use crate::rewrite::{
    Exchange, HeaderList, RequestInfo, ResponseHead, ResponseSink, RewriteMiddleware, Selector,
};

// Selectors registered by the embedding filter before the root context exists
thread_local! {
    static SELECTORS: RefCell<Option<(Vec<Selector>, Vec<Selector>)>> = const { RefCell::new(None) };
}

/// Register the filter with the proxy-wasm runtime.
///
/// Call from the embedding crate's `proxy_wasm::main!` block.
pub fn install(request_selectors: Vec<Selector>, response_selectors: Vec<Selector>) {
    SELECTORS.with(|s| {
        *s.borrow_mut() = Some((request_selectors, response_selectors));
    });

    proxy_wasm::set_log_level(LogLevel::Info);
    proxy_wasm::set_root_context(|_| -> Box<dyn RootContext> { Box::new(RewriteRootContext::new()) });
}

/// Response sink backed by Envoy's header map and the current body chunk
#[derive(Default)]
struct EnvoyResponse {
    body: Vec<u8>,
    ended: bool,
}

impl EnvoyResponse {
    fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }
}

impl ResponseSink for EnvoyResponse {
    fn status(&self) -> u16 {
        self.header(":status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(200)
    }

    fn header(&self, name: &str) -> Option<String> {
        hostcalls::get_map_value(MapType::HttpResponseHeaders, name)
            .ok()
            .flatten()
    }

    fn headers(&self) -> HeaderList {
        hostcalls::get_map(MapType::HttpResponseHeaders).unwrap_or_default()
    }

    fn remove_header(&mut self, name: &str) {
        if let Err(status) = hostcalls::set_map_value(MapType::HttpResponseHeaders, name, None) {
            warn!("Failed to remove response header '{}': {:?}", name, status);
        }
    }

    // Envoy forwards the head itself once the header callback returns
    fn write_head(&mut self, _head: ResponseHead) {}

    fn write(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    fn end(&mut self) {
        self.ended = true;
    }
}

/// Root context for filter lifecycle management
struct RewriteRootContext {
    middleware: Option<RewriteMiddleware>,
}

impl RewriteRootContext {
    fn new() -> Self {
        Self { middleware: None }
    }
}

impl Context for RewriteRootContext {}

impl RootContext for RewriteRootContext {
    fn on_configure(&mut self, _plugin_configuration_size: usize) -> bool {
        let config = match self.get_plugin_configuration() {
            Some(bytes) => match RewriteConfig::from_bytes(&bytes) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Rejecting HTML rewrite filter configuration: {}", e);
                    return false;
                }
            },
            None => RewriteConfig::default(),
        };

        let (request_selectors, response_selectors) =
            SELECTORS.with(|s| s.borrow().clone()).unwrap_or_default();

        info!(
            "HTML rewrite filter initialized: {} request / {} response selectors, html_only={}, max_timeout={}",
            request_selectors.len(),
            response_selectors.len(),
            config.html_only,
            config.max_timeout
        );

        self.middleware = Some(RewriteMiddleware::new(request_selectors, response_selectors, config));
        true
    }

    fn create_http_context(&self, context_id: u32) -> Option<Box<dyn HttpContext>> {
        Some(Box::new(RewriteHttpContext {
            context_id,
            middleware: self.middleware.clone(),
            exchange: None,
        }))
    }

    fn get_type(&self) -> Option<ContextType> {
        Some(ContextType::HttpContext)
    }
}

/// HTTP context for per-request processing
struct RewriteHttpContext {
    context_id: u32,
    middleware: Option<RewriteMiddleware>,
    exchange: Option<Exchange<EnvoyResponse>>,
}

impl Context for RewriteHttpContext {}

impl HttpContext for RewriteHttpContext {
    fn on_http_request_headers(&mut self, _num_headers: usize, end_of_stream: bool) -> Action {
        let Some(middleware) = &self.middleware else {
            return Action::Continue;
        };

        let request = RequestInfo {
            method: self.get_http_request_header(":method").unwrap_or_default(),
            url: self.get_http_request_header(":path").unwrap_or_default(),
            headers: self
                .get_http_request_headers()
                .into_iter()
                .filter(|(name, _)| !name.starts_with(':'))
                .collect(),
        };
        debug!(
            "[context_id={}] {} {}",
            self.context_id, request.method, request.url
        );

        let mut exchange = middleware.wrap(request, EnvoyResponse::default());
        if end_of_stream {
            exchange.request.end();
        }
        self.exchange = Some(exchange);

        Action::Continue
    }

    fn on_http_request_body(&mut self, body_size: usize, end_of_stream: bool) -> Action {
        let chunk = self.get_http_request_body(0, body_size).unwrap_or_default();

        if let Some(exchange) = self.exchange.as_mut() {
            exchange.request.data(&chunk);
            if end_of_stream {
                exchange.request.end();
            }
        }

        Action::Continue
    }

    fn on_http_response_headers(&mut self, _num_headers: usize, end_of_stream: bool) -> Action {
        let status = self
            .get_http_response_header(":status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        if let Some(exchange) = self.exchange.as_mut() {
            exchange.response.write_head(ResponseHead::new(status));
            if end_of_stream {
                exchange.response.force_close();
            }
        }

        Action::Continue
    }

    fn on_http_response_body(&mut self, body_size: usize, end_of_stream: bool) -> Action {
        let rewriting = self
            .exchange
            .as_ref()
            .is_some_and(|e| e.response.decision().is_html);
        if !rewriting {
            return Action::Continue;
        }

        let chunk = self.get_http_response_body(0, body_size).unwrap_or_default();
        let Some(exchange) = self.exchange.as_mut() else {
            return Action::Continue;
        };

        let response = &mut exchange.response;
        response.write(&chunk);
        if end_of_stream {
            response.end();
            if !response.is_closed() {
                response.force_close();
            }
        }
        let transformed = response.inner_mut().take_body();

        debug!(
            "[context_id={}] body chunk {} -> {} bytes, end_of_stream: {}",
            self.context_id,
            chunk.len(),
            transformed.len(),
            end_of_stream
        );
        self.set_http_response_body(0, body_size, &transformed);

        Action::Continue
    }

    fn on_log(&mut self) {
        let ended = self
            .exchange
            .as_ref()
            .map_or(true, |e| e.response.inner().ended);
        debug!(
            "[context_id={}] Request processing complete, response ended: {}",
            self.context_id, ended
        );
    }
}
