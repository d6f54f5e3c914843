//! Telemetry Module for the HTML rewrite filter
//!
//! In Wasm, we emit structured logs that can be collected by
//! Envoy's access logging or external collectors.

use log::{info, warn};
use serde::Serialize;

/// Rewrite lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteEventType {
    /// Response routed through the tokenizer
    Intercepted,
    /// Response passed through untouched
    Bypassed,
    /// Tokenizer drained and the response was ended
    Finalized,
    /// Completion budget ran out before draining
    TimedOut,
    /// Codec or tokenizer failure, response ended early
    Faulted,
    /// Host ended the response before the tokenizer drained
    ForceClosed,
}

/// Audit event for one response
#[derive(Debug, Clone, Serialize)]
pub struct RewriteEvent {
    pub event_type: RewriteEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gzipped: Option<bool>,
    /// Body bytes received from upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_in: Option<usize>,
    /// Body bytes written to the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<usize>,
    /// Plain bytes inflated from a gzip body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_inflated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RewriteEvent {
    pub fn new(event_type: RewriteEventType) -> Self {
        Self {
            event_type,
            url: None,
            status: None,
            gzipped: None,
            bytes_in: None,
            bytes_out: None,
            bytes_inflated: None,
            reason: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_gzipped(mut self, gzipped: bool) -> Self {
        self.gzipped = Some(gzipped);
        self
    }

    pub fn with_bytes(mut self, bytes_in: usize, bytes_out: usize) -> Self {
        self.bytes_in = Some(bytes_in);
        self.bytes_out = Some(bytes_out);
        self
    }

    pub fn with_inflated(mut self, bytes: usize) -> Self {
        self.bytes_inflated = Some(bytes);
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Log the event
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => match self.event_type {
                RewriteEventType::TimedOut | RewriteEventType::Faulted => {
                    warn!("[HTML-REWRITE-AUDIT] {}", json);
                }
                _ => {
                    info!("[HTML-REWRITE-AUDIT] {}", json);
                }
            },
            Err(e) => {
                warn!("Failed to serialize rewrite event: {}", e);
            }
        }
    }
}

/// Response routed through the rewrite pipeline
pub fn audit_intercepted(url: &str, status: u16, gzipped: bool) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::Intercepted)
        .with_url(url)
        .with_status(status)
        .with_gzipped(gzipped)
}

/// Response passed through
pub fn audit_bypassed(url: &str, reason: &str) -> RewriteEvent {
    RewriteEvent::new(RewriteEventType::Bypassed)
        .with_url(url)
        .with_reason(reason)
}
