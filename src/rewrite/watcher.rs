//! Completion Watcher
//!
//! Races the tokenizer's drained signal against a bounded number of host
//! ticks. The first settlement wins; the owner drops the watcher on
//! finalization, which is the cancellation.

use std::fmt::Display;

use log::debug;

use crate::config::CompletionBudget;

/// How a draining response was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Both tokenizer sides finished
    Drained,
    /// `max_polls` ticks elapsed without draining
    TimedOut,
    /// The drain check itself failed
    Faulted,
    /// The host ended the response before the tokenizer drained
    ForceClosed,
}

/// Bounded poller armed at the tokenizer's finish milestone
#[derive(Debug, Clone)]
pub struct CompletionWatcher {
    budget: CompletionBudget,
    polls: u32,
}

impl CompletionWatcher {
    pub fn start(budget: CompletionBudget) -> Self {
        Self { budget, polls: 0 }
    }

    /// Ticks consumed so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// One tick. `check` reports whether the tokenizer is fully drained.
    ///
    /// Returns `None` while still waiting. An error from `check` settles
    /// the watcher as `Faulted` immediately.
    pub fn poll<E, F>(&mut self, check: F) -> Option<Settlement>
    where
        E: Display,
        F: FnOnce() -> Result<bool, E>,
    {
        self.polls += 1;

        match check() {
            Ok(true) => Some(Settlement::Drained),
            Ok(false) if self.polls >= self.budget.max_polls => Some(Settlement::TimedOut),
            Ok(false) => None,
            Err(e) => {
                debug!("drain check failed on poll {}: {}", self.polls, e);
                Some(Settlement::Faulted)
            }
        }
    }
}
