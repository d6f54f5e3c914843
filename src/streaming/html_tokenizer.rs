//! lol_html-backed Tokenizer
//!
//! Bound selectors are collected first; the rewriter is built on the first
//! `write`/`end`, since lol_html takes all element handlers up front.
//! Transformed bytes accumulate in a shared buffer until `read` takes them.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use lol_html::html_content::Element;
use lol_html::{
    ElementContentHandlers, HandlerResult, HtmlRewriter, OutputSink, Selector as QuerySelector,
    Settings,
};

use super::tokenizer::{DrainState, Tokenizer, TokenizerError};
use crate::rewrite::selector::BoundSelector;

/// Output sink appending into a buffer shared with the tokenizer
struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl OutputSink for SharedOutput {
    fn handle_chunk(&mut self, chunk: &[u8]) {
        self.0.borrow_mut().extend_from_slice(chunk);
    }
}

enum Stage {
    /// Accepting registrations, no input seen
    Collecting,
    Running(Box<HtmlRewriter<'static, SharedOutput>>),
    Ended,
    Failed(TokenizerError),
}

/// Streaming HTML tokenizer built on lol_html
pub struct HtmlTokenizer {
    selectors: Vec<BoundSelector>,
    stage: Stage,
    output: Rc<RefCell<Vec<u8>>>,
}

impl HtmlTokenizer {
    pub fn new() -> Self {
        Self {
            selectors: Vec::new(),
            stage: Stage::Collecting,
            output: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Number of registered selectors not yet compiled into the rewriter
    pub fn pending_selectors(&self) -> usize {
        self.selectors.len()
    }

    fn build(&mut self) -> Result<HtmlRewriter<'static, SharedOutput>, TokenizerError> {
        let mut handlers = Vec::with_capacity(self.selectors.len());

        for bound in self.selectors.drain(..) {
            let selector = bound
                .query()
                .parse::<QuerySelector>()
                .map_err(|e| TokenizerError::InvalidSelector {
                    query: bound.query().to_string(),
                    reason: e.to_string(),
                })?;

            let handler = ElementContentHandlers::default().element(
                move |el: &mut Element<'_, '_>| -> HandlerResult {
                    bound.invoke(el);
                    Ok(())
                },
            );

            handlers.push((Cow::Owned(selector), handler));
        }

        Ok(HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            SharedOutput(Rc::clone(&self.output)),
        ))
    }

    fn ensure_running(&mut self) -> Result<(), TokenizerError> {
        if matches!(self.stage, Stage::Collecting) {
            match self.build() {
                Ok(rewriter) => self.stage = Stage::Running(Box::new(rewriter)),
                Err(err) => {
                    self.stage = Stage::Failed(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

impl Default for HtmlTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for HtmlTokenizer {
    fn select_all(&mut self, selector: BoundSelector) {
        self.selectors.push(selector);
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), TokenizerError> {
        self.ensure_running()?;

        let result = match &mut self.stage {
            Stage::Running(rewriter) => rewriter
                .write(chunk)
                .map_err(|e| TokenizerError::Rewriting(e.to_string())),
            Stage::Ended => return Err(TokenizerError::Ended),
            Stage::Failed(err) => return Err(err.clone()),
            Stage::Collecting => Ok(()),
        };

        if let Err(ref err) = result {
            self.stage = Stage::Failed(err.clone());
        }
        result
    }

    fn end(&mut self) -> Result<(), TokenizerError> {
        self.ensure_running()?;

        match std::mem::replace(&mut self.stage, Stage::Ended) {
            Stage::Running(rewriter) => match rewriter.end() {
                Ok(()) => Ok(()),
                Err(e) => {
                    let err = TokenizerError::Rewriting(e.to_string());
                    self.stage = Stage::Failed(err.clone());
                    Err(err)
                }
            },
            Stage::Failed(err) => {
                self.stage = Stage::Failed(err.clone());
                Err(err)
            }
            Stage::Ended => Err(TokenizerError::Ended),
            Stage::Collecting => Ok(()),
        }
    }

    fn read(&mut self) -> Option<Vec<u8>> {
        let mut output = self.output.borrow_mut();
        if output.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *output))
        }
    }

    fn drain_state(&self) -> Result<DrainState, TokenizerError> {
        let write_ended = match &self.stage {
            Stage::Failed(err) => return Err(err.clone()),
            Stage::Ended => true,
            _ => false,
        };

        Ok(DrainState {
            write_ended,
            read_ended: write_ended && self.output.borrow().is_empty(),
        })
    }
}
