//! Streaming HTML Rewrite Filter
//!
//! Intercepts an HTTP request/response pair and applies selector callbacks
//! to HTML bodies as they stream, without buffering whole documents.
//! Gzip-encoded HTML is inflated on the fly; non-HTML responses pass
//! through untouched.
//!
//! The core is host-agnostic: a host supplies a `ResponseSink`, drives the
//! `ResponseInterceptor` with writes and periodic ticks, and the interceptor
//! ends the real response exactly once.
//!
//! Targets: native hosts and wasm32-wasi (Envoy proxy-wasm ABI)

pub mod config;
pub mod rewrite;
pub mod streaming;
pub mod telemetry;

#[cfg(target_arch = "wasm32")]
pub mod envoy;

pub use config::{CompletionBudget, ConfigError, RewriteConfig, RewriteOptions};
pub use lol_html::html_content::{ContentType, Element};
pub use rewrite::{
    BufferedResponse, Exchange, InterceptedRequest, Phase, RequestInfo, ResponseHead,
    ResponseInfo, ResponseInterceptor, ResponseSink, RewriteMiddleware, Selector,
};
pub use streaming::{Tokenizer, TokenizerError};
