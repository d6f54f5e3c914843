//! Stream Gate
//!
//! Decides per response whether the body is rewritten and whether it must
//! be inflated first, then strips the headers the rewrite would falsify.

use log::debug;

use super::sink::{remove_header, HeaderList, ResponseSink};

/// Routing decision for one response, fixed at `write_head`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptionDecision {
    pub intercept: bool,
    pub is_html: bool,
    /// Only ever set together with `is_html`
    pub is_gzipped: bool,
}

impl InterceptionDecision {
    /// Byte-identical passthrough
    pub fn bypass() -> Self {
        Self::default()
    }
}

/// Eligibility rules shared by every response of a middleware
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamGate {
    html_only: bool,
}

impl StreamGate {
    pub fn new(html_only: bool) -> Self {
        Self { html_only }
    }

    /// Static-asset short-circuit, checked before any header is inspected
    pub fn bypasses_url(&self, url: &str) -> bool {
        if !self.html_only {
            return false;
        }
        let url = url.to_ascii_lowercase();
        url.ends_with(".js") || url.ends_with(".css")
    }

    /// Decide from the response's content headers
    pub fn evaluate(
        &self,
        content_type: Option<&str>,
        content_encoding: Option<&str>,
    ) -> InterceptionDecision {
        let is_html = !self.html_only || content_type.is_some_and(|ct| ct.starts_with("text/html"));
        if !is_html {
            return InterceptionDecision::bypass();
        }

        let is_gzipped = content_encoding.is_some_and(|ce| ce.trim().eq_ignore_ascii_case("gzip"));

        InterceptionDecision {
            intercept: true,
            is_html,
            is_gzipped,
        }
    }

    /// Strip `Content-Length` (and `Content-Encoding` when inflating) from both
    /// the live headers and the positional ones
    pub fn apply<S: ResponseSink + ?Sized>(
        &self,
        decision: &InterceptionDecision,
        sink: &mut S,
        mut positional: Option<&mut HeaderList>,
    ) {
        if !decision.is_html {
            return;
        }

        sink.remove_header("content-length");
        if let Some(headers) = positional.as_deref_mut() {
            remove_header(headers, "content-length");
        }

        if decision.is_gzipped {
            sink.remove_header("content-encoding");
            if let Some(headers) = positional.as_deref_mut() {
                remove_header(headers, "content-encoding");
            }
            debug!("gzip body will be inflated and re-emitted uncompressed");
        }
    }
}
