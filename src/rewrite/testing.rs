//! Scripted tokenizer double for pipeline tests

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::selector::BoundSelector;
use crate::streaming::{DrainState, Tokenizer, TokenizerError, TokenizerFactory};

/// When the double reports itself drained
#[derive(Debug, Clone, Copy)]
pub enum Drain {
    /// As soon as input ended and output was read
    OnEnd,
    /// On the n-th drain check after input ended
    AfterChecks(u32),
    Never,
    /// Every drain check fails
    Broken,
}

/// Echoes input to output and records everything it was fed
pub struct ScriptedTokenizer {
    input: Arc<Mutex<Vec<u8>>>,
    pending: Vec<u8>,
    ended: bool,
    mode: Drain,
    checks: Cell<u32>,
}

impl Tokenizer for ScriptedTokenizer {
    fn select_all(&mut self, _selector: BoundSelector) {}

    fn write(&mut self, chunk: &[u8]) -> Result<(), TokenizerError> {
        if self.ended {
            return Err(TokenizerError::Ended);
        }
        self.input.lock().unwrap().extend_from_slice(chunk);
        self.pending.extend_from_slice(chunk);
        Ok(())
    }

    fn end(&mut self) -> Result<(), TokenizerError> {
        self.ended = true;
        Ok(())
    }

    fn read(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    fn drain_state(&self) -> Result<DrainState, TokenizerError> {
        if self.ended {
            self.checks.set(self.checks.get() + 1);
        }
        let flushed = self.ended && self.pending.is_empty();

        let read_ended = match self.mode {
            Drain::OnEnd => flushed,
            Drain::AfterChecks(n) => flushed && self.checks.get() >= n,
            Drain::Never => false,
            Drain::Broken => return Err(TokenizerError::Rewriting("state unavailable".to_string())),
        };

        Ok(DrainState {
            write_ended: self.ended,
            read_ended,
        })
    }
}

/// Factory plus counters: bytes fed to any built tokenizer, and build count
pub struct Scripted {
    pub factory: TokenizerFactory,
    pub input: Arc<Mutex<Vec<u8>>>,
    pub builds: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn new(mode: Drain) -> Self {
        let input = Arc::new(Mutex::new(Vec::new()));
        let builds = Arc::new(AtomicUsize::new(0));

        let fed = Arc::clone(&input);
        let counter = Arc::clone(&builds);
        let factory: TokenizerFactory = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(ScriptedTokenizer {
                input: Arc::clone(&fed),
                pending: Vec::new(),
                ended: false,
                mode,
                checks: Cell::new(0),
            }) as Box<dyn Tokenizer>
        });

        Self { factory, input, builds }
    }

    pub fn fed(&self) -> Vec<u8> {
        self.input.lock().unwrap().clone()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}
