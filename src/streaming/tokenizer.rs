//! Tokenizer Boundary
//!
//! The markup tokenizer is an external collaborator. The pipeline only needs:
//! - registration of bound selectors
//! - `write` / `end` on the input side
//! - `read` of transformed bytes on the output side
//! - a drain signal telling whether both sides are finished

use std::sync::Arc;

use crate::rewrite::selector::BoundSelector;

/// Builds one fresh tokenizer per intercepted stream
pub type TokenizerFactory = Arc<dyn Fn() -> Box<dyn Tokenizer> + Send + Sync>;

/// Streaming markup tokenizer driven by the rewrite pipeline
pub trait Tokenizer {
    /// Register a bound selector. Registration is total.
    fn select_all(&mut self, selector: BoundSelector);

    /// Push input bytes, in arrival order
    fn write(&mut self, chunk: &[u8]) -> Result<(), TokenizerError>;

    /// Signal end of input
    fn end(&mut self) -> Result<(), TokenizerError>;

    /// Take transformed bytes produced so far, if any
    fn read(&mut self) -> Option<Vec<u8>>;

    /// Report whether the write side ended and the read side drained
    fn drain_state(&self) -> Result<DrainState, TokenizerError>;
}

/// Progress of both tokenizer sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainState {
    /// `end` has been accepted on the input side
    pub write_ended: bool,
    /// Every transformed byte has been read out after the end
    pub read_ended: bool,
}

impl DrainState {
    /// Both sides are finished
    pub fn is_drained(&self) -> bool {
        self.write_ended && self.read_ended
    }
}

/// Tokenizer failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    /// A query could not be compiled
    InvalidSelector { query: String, reason: String },
    /// The underlying rewriter rejected the input
    Rewriting(String),
    /// Input arrived after `end`
    Ended,
}

impl std::fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenizerError::InvalidSelector { query, reason } => {
                write!(f, "Invalid selector '{}': {}", query, reason)
            }
            TokenizerError::Rewriting(e) => write!(f, "Rewriting failed: {}", e),
            TokenizerError::Ended => write!(f, "Tokenizer input already ended"),
        }
    }
}

impl std::error::Error for TokenizerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_state_requires_both_sides() {
        assert!(!DrainState::default().is_drained());
        assert!(!DrainState { write_ended: true, read_ended: false }.is_drained());
        assert!(DrainState { write_ended: true, read_ended: true }.is_drained());
    }

    #[test]
    fn test_error_display() {
        let err = TokenizerError::InvalidSelector {
            query: "a[".to_string(),
            reason: "unexpected end".to_string(),
        };
        assert!(err.to_string().contains("a["));
        assert!(TokenizerError::Ended.to_string().contains("ended"));
    }
}
