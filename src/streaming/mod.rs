//! Streaming module for the rewrite pipeline
//!
//! This module provides the byte-stream stages that sit between the
//! intercepted response and the real sink:
//! - gzip inflate for compressed upstream bodies
//! - the tokenizer boundary and its lol_html implementation

pub mod gzip_bridge;
pub mod html_tokenizer;
pub mod tokenizer;

pub use gzip_bridge::GzipBridge;
pub use html_tokenizer::HtmlTokenizer;
pub use tokenizer::{DrainState, Tokenizer, TokenizerError, TokenizerFactory};
