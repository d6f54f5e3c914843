//! Rewrite module for the HTML rewrite filter
//!
//! This module provides:
//! - Selector registration against a tokenizer
//! - The eligibility gate (content-type, encoding, static assets)
//! - Request and response interceptors
//! - Bounded completion watching for draining responses
//! - The middleware entry point

pub mod gate;
pub mod middleware;
pub mod request;
pub mod response;
pub mod selector;
pub mod sink;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use gate::{InterceptionDecision, StreamGate};
pub use middleware::{Exchange, RewriteMiddleware};
pub use request::{InterceptedRequest, RequestInterceptor};
pub use response::{Phase, ResponseBinding, ResponseInterceptor};
pub use selector::{BoundSelector, RequestInfo, ResponseInfo, Selector, SelectorBinder, SelectorCallback};
pub use sink::{BufferedResponse, HeaderList, ResponseHead, ResponseSink};
pub use watcher::{CompletionWatcher, Settlement};
