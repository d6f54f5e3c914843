//! Rewrite Middleware
//!
//! Entry point: wraps a request/response pair into an `Exchange` and hands
//! it to the next handler, synchronously and exactly once.

use std::rc::Rc;
use std::sync::Arc;

use log::debug;

use super::gate::StreamGate;
use super::request::{InterceptedRequest, RequestInterceptor};
use super::response::{ResponseBinding, ResponseInterceptor};
use super::selector::{RequestInfo, Selector};
use super::sink::ResponseSink;
use crate::config::RewriteConfig;
use crate::streaming::{HtmlTokenizer, Tokenizer, TokenizerFactory};
use crate::telemetry::audit_bypassed;

/// A wrapped request/response pair
pub struct Exchange<S: ResponseSink> {
    pub request: InterceptedRequest,
    pub response: ResponseInterceptor<S>,
}

/// Streaming HTML rewrite middleware
#[derive(Clone)]
pub struct RewriteMiddleware {
    request_selectors: Arc<[Selector]>,
    response_selectors: Arc<[Selector]>,
    config: RewriteConfig,
    gate: StreamGate,
    tokenizer: TokenizerFactory,
}

impl RewriteMiddleware {
    /// `options` takes a `RewriteConfig`, or a bare `bool` meaning `html_only`
    pub fn new(
        request_selectors: Vec<Selector>,
        response_selectors: Vec<Selector>,
        options: impl Into<RewriteConfig>,
    ) -> Self {
        let config = options.into();
        Self {
            request_selectors: request_selectors.into(),
            response_selectors: response_selectors.into(),
            gate: StreamGate::new(config.html_only),
            config,
            tokenizer: Arc::new(|| Box::new(HtmlTokenizer::new()) as Box<dyn Tokenizer>),
        }
    }

    /// Replace the lol_html tokenizer
    pub fn with_tokenizer(mut self, tokenizer: TokenizerFactory) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// Wire interceptors around the pair without calling a next handler
    pub fn wrap<S: ResponseSink>(&self, request: RequestInfo, response: S) -> Exchange<S> {
        let request = Rc::new(request);

        if self.gate.bypasses_url(&request.url) {
            audit_bypassed(&request.url, "static asset").emit();
            return Exchange {
                request: InterceptedRequest::new(request, None),
                response: ResponseInterceptor::passthrough(response),
            };
        }

        let request_interceptor = (!self.request_selectors.is_empty()).then(|| {
            RequestInterceptor::new((self.tokenizer)(), &self.request_selectors, Rc::clone(&request))
        });

        let response = if self.response_selectors.is_empty() {
            ResponseInterceptor::passthrough(response)
        } else {
            let binding = ResponseBinding::new(
                Rc::clone(&request),
                Arc::clone(&self.response_selectors),
                &self.config,
                Arc::clone(&self.tokenizer),
            );
            ResponseInterceptor::new(response, binding)
        };

        debug!(
            "{} {}: request interception {}, response selectors {}",
            request.method,
            request.url,
            request_interceptor.is_some(),
            self.response_selectors.len()
        );

        Exchange {
            request: InterceptedRequest::new(request, request_interceptor),
            response,
        }
    }

    /// Wrap the pair, then call `next` once before returning
    pub fn handle<S, R, N>(&self, request: RequestInfo, response: S, next: N) -> R
    where
        S: ResponseSink,
        N: FnOnce(Exchange<S>) -> R,
    {
        next(self.wrap(request, response))
    }
}
