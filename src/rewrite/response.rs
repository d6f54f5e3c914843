//! Response Interceptor
//!
//! Decorates the real `ResponseSink`. Lifecycle per response:
//! `Idle -> HeadWritten -> Streaming -> Draining -> Closed`.
//!
//! - `write_head` runs the gate once and fixes the routing decision
//! - rewritten bytes go `[gzip ->] tokenizer -> inner.write`
//! - `end` signals end of input; the response closes when the tokenizer
//!   reports drained, or when the completion watcher gives up
//! - the inner `end` runs exactly once, whichever path gets there first

use std::borrow::Cow;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};

use super::gate::{InterceptionDecision, StreamGate};
use super::selector::{RequestInfo, ResponseInfo, Selector, SelectorBinder};
use super::sink::{HeaderList, ResponseHead, ResponseSink};
use super::watcher::{CompletionWatcher, Settlement};
use crate::config::{CompletionBudget, RewriteConfig};
use crate::streaming::{GzipBridge, Tokenizer, TokenizerError, TokenizerFactory};
use crate::telemetry::{audit_bypassed, audit_intercepted, RewriteEvent, RewriteEventType};

/// Lifecycle of an intercepted response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    HeadWritten,
    Streaming,
    Draining,
    Closed,
}

/// Everything needed to build a pipeline once the head is known
pub struct ResponseBinding {
    request: Rc<RequestInfo>,
    selectors: Arc<[Selector]>,
    gate: StreamGate,
    budget: CompletionBudget,
    tokenizer: TokenizerFactory,
}

impl ResponseBinding {
    pub fn new(
        request: Rc<RequestInfo>,
        selectors: Arc<[Selector]>,
        config: &RewriteConfig,
        tokenizer: TokenizerFactory,
    ) -> Self {
        Self {
            request,
            selectors,
            gate: StreamGate::new(config.html_only),
            budget: config.budget(),
            tokenizer,
        }
    }
}

/// Failure inside the rewrite pipeline
#[derive(Debug)]
enum PipelineError {
    Decode(io::Error),
    Tokenizer(TokenizerError),
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        PipelineError::Decode(e)
    }
}

impl From<TokenizerError> for PipelineError {
    fn from(e: TokenizerError) -> Self {
        PipelineError::Tokenizer(e)
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Decode(e) => write!(f, "gzip decode failed: {}", e),
            PipelineError::Tokenizer(e) => write!(f, "{}", e),
        }
    }
}

/// Per-response pipeline state, created at `write_head`
struct Pipeline {
    tokenizer: Box<dyn Tokenizer>,
    gzip: Option<GzipBridge>,
    watcher: Option<CompletionWatcher>,
    bytes_in: usize,
    bytes_out: usize,
}

impl Pipeline {
    fn push<S: ResponseSink>(&mut self, chunk: &[u8], inner: &mut S) -> Result<(), PipelineError> {
        self.bytes_in += chunk.len();

        let plain: Cow<'_, [u8]> = match self.gzip.as_mut() {
            Some(gzip) => Cow::Owned(gzip.write(chunk)?),
            None => Cow::Borrowed(chunk),
        };
        if !plain.is_empty() {
            self.tokenizer.write(&plain)?;
        }

        self.flush(inner);
        Ok(())
    }

    fn finish<S: ResponseSink>(&mut self, chunk: Option<&[u8]>, inner: &mut S) -> Result<(), PipelineError> {
        let chunk = chunk.filter(|c| !c.is_empty());
        self.bytes_in += chunk.map_or(0, <[u8]>::len);

        let plain: Option<Cow<'_, [u8]>> = match self.gzip.as_mut() {
            Some(gzip) => Some(Cow::Owned(gzip.end(chunk)?)),
            None => chunk.map(Cow::Borrowed),
        };
        if let Some(plain) = plain.filter(|p| !p.is_empty()) {
            self.tokenizer.write(&plain)?;
        }
        self.tokenizer.end()?;

        self.flush(inner);
        Ok(())
    }

    /// Move transformed bytes to the real sink, in order
    fn flush<S: ResponseSink>(&mut self, inner: &mut S) {
        while let Some(out) = self.tokenizer.read() {
            self.bytes_out += out.len();
            inner.write(&out);
        }
    }

    fn is_drained(&self) -> Result<bool, TokenizerError> {
        self.tokenizer.drain_state().map(|state| state.is_drained())
    }
}

enum Route {
    Passthrough,
    Rewrite(Pipeline),
}

/// `ResponseSink` decorator that splices the rewrite pipeline in front of `S`
pub struct ResponseInterceptor<S: ResponseSink> {
    inner: S,
    binding: Option<ResponseBinding>,
    phase: Phase,
    decision: InterceptionDecision,
    route: Route,
    settlement: Option<Settlement>,
}

impl<S: ResponseSink> ResponseInterceptor<S> {
    pub fn new(inner: S, binding: ResponseBinding) -> Self {
        Self {
            inner,
            binding: Some(binding),
            phase: Phase::Idle,
            decision: InterceptionDecision::bypass(),
            route: Route::Passthrough,
            settlement: None,
        }
    }

    /// Never rewrites; every call goes straight to `inner`
    pub fn passthrough(inner: S) -> Self {
        Self {
            inner,
            binding: None,
            phase: Phase::Idle,
            decision: InterceptionDecision::bypass(),
            route: Route::Passthrough,
            settlement: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Decision taken at `write_head` (bypass before that)
    pub fn decision(&self) -> InterceptionDecision {
        self.decision
    }

    /// How a rewritten response was closed; `None` while open or for passthrough
    pub fn settlement(&self) -> Option<Settlement> {
        self.settlement
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// End of the outbound body, with an optional final chunk
    pub fn end_with(&mut self, chunk: Option<&[u8]>) {
        match self.phase {
            Phase::Draining | Phase::Closed => {
                debug!("{}: end after end ignored", self.url());
                return;
            }
            Phase::Idle => self.implicit_head(),
            Phase::HeadWritten | Phase::Streaming => {}
        }

        let budget = self.budget();
        match &mut self.route {
            Route::Passthrough => {
                if let Some(chunk) = chunk.filter(|c| !c.is_empty()) {
                    self.inner.write(chunk);
                }
                self.phase = Phase::Closed;
                self.inner.end();
            }
            Route::Rewrite(pipeline) => {
                self.phase = Phase::Draining;
                match pipeline.finish(chunk, &mut self.inner) {
                    Ok(()) => {
                        // finish milestone: arm the watcher, then look for the drained signal
                        pipeline.watcher = Some(CompletionWatcher::start(budget));
                        self.check_drained();
                    }
                    Err(e) => self.fault(e),
                }
            }
        }
    }

    /// One completion tick; the host calls this every `poll_interval_ms`.
    /// Does nothing unless the response is draining.
    pub fn on_tick(&mut self) {
        if self.phase != Phase::Draining {
            return;
        }
        let Route::Rewrite(pipeline) = &mut self.route else {
            return;
        };

        pipeline.flush(&mut self.inner);

        let Some(watcher) = pipeline.watcher.as_mut() else {
            return;
        };
        let tokenizer = &pipeline.tokenizer;
        let settled = watcher.poll(|| tokenizer.drain_state().map(|state| state.is_drained()));

        if let Some(settlement) = settled {
            self.finalize(settlement, None);
        }
    }

    /// Finalize now, for hosts that cannot emit body bytes later
    pub fn force_close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        if self.phase != Phase::Draining {
            self.end_with(None);
        }
        if self.phase != Phase::Closed {
            debug!("{}: closed by host before draining", self.url());
            self.finalize(Settlement::ForceClosed, Some("closed by host"));
        }
    }

    fn url(&self) -> &str {
        self.binding.as_ref().map_or("", |b| b.request.url.as_str())
    }

    fn budget(&self) -> CompletionBudget {
        self.binding.as_ref().map(|b| b.budget).unwrap_or_default()
    }

    fn implicit_head(&mut self) {
        let status = self.inner.status();
        ResponseSink::write_head(self, ResponseHead::new(status));
    }

    /// Completion path driven by the tokenizer's own drained signal
    fn check_drained(&mut self) {
        let Route::Rewrite(pipeline) = &mut self.route else {
            return;
        };
        pipeline.flush(&mut self.inner);

        match pipeline.is_drained() {
            Ok(true) => self.finalize(Settlement::Drained, None),
            Ok(false) => debug!("{}: draining, waiting on tokenizer", self.url()),
            Err(e) => {
                let reason = e.to_string();
                self.finalize(Settlement::Faulted, Some(&reason));
            }
        }
    }

    fn fault(&mut self, err: PipelineError) {
        warn!("{}: rewrite pipeline failed, ending response: {}", self.url(), err);
        let reason = err.to_string();
        self.finalize(Settlement::Faulted, Some(&reason));
    }

    /// The single place the inner `end` is called for rewritten responses
    fn finalize(&mut self, settlement: Settlement, reason: Option<&str>) {
        if self.phase == Phase::Closed {
            return;
        }
        let url = self.url().to_string();

        let mut event = match settlement {
            Settlement::Drained => RewriteEvent::new(RewriteEventType::Finalized),
            Settlement::TimedOut => RewriteEvent::new(RewriteEventType::TimedOut),
            Settlement::Faulted => RewriteEvent::new(RewriteEventType::Faulted),
            Settlement::ForceClosed => RewriteEvent::new(RewriteEventType::ForceClosed),
        };

        if let Route::Rewrite(pipeline) = &mut self.route {
            pipeline.flush(&mut self.inner);
            if let Some(watcher) = pipeline.watcher.take() {
                if settlement == Settlement::TimedOut {
                    warn!(
                        "{}: not drained after {} polls, forcing end",
                        url,
                        watcher.polls()
                    );
                }
            }
            event = event
                .with_gzipped(pipeline.gzip.is_some())
                .with_bytes(pipeline.bytes_in, pipeline.bytes_out);
            if let Some(gzip) = &pipeline.gzip {
                event = event.with_inflated(gzip.bytes_out());
            }
        }

        self.phase = Phase::Closed;
        self.settlement = Some(settlement);
        self.inner.end();

        event = event.with_url(&url).with_status(self.inner.status());
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        event.emit();
    }
}

impl<S: ResponseSink> ResponseSink for ResponseInterceptor<S> {
    fn status(&self) -> u16 {
        self.inner.status()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.inner.header(name)
    }

    fn headers(&self) -> HeaderList {
        self.inner.headers()
    }

    fn remove_header(&mut self, name: &str) {
        self.inner.remove_header(name);
    }

    fn write_head(&mut self, mut head: ResponseHead) {
        if self.phase != Phase::Idle {
            debug!("{}: head already written, ignoring", self.url());
            return;
        }

        if let Some(binding) = &self.binding {
            let content_type = self
                .inner
                .header("content-type")
                .or_else(|| head.header("content-type").map(String::from));
            let content_encoding = self
                .inner
                .header("content-encoding")
                .or_else(|| head.header("content-encoding").map(String::from));

            let decision = binding
                .gate
                .evaluate(content_type.as_deref(), content_encoding.as_deref());
            binding.gate.apply(&decision, &mut self.inner, head.headers.as_mut());

            if decision.is_html {
                let response = Rc::new(ResponseInfo::from_head(&head, self.inner.headers()));
                let mut tokenizer = (binding.tokenizer)();
                SelectorBinder::new(Rc::clone(&binding.request), response)
                    .bind(tokenizer.as_mut(), &binding.selectors);

                self.route = Route::Rewrite(Pipeline {
                    tokenizer,
                    gzip: decision.is_gzipped.then(GzipBridge::new),
                    watcher: None,
                    bytes_in: 0,
                    bytes_out: 0,
                });
                audit_intercepted(&binding.request.url, head.status, decision.is_gzipped).emit();
            } else {
                audit_bypassed(
                    &binding.request.url,
                    content_type.as_deref().unwrap_or("no content-type"),
                )
                .emit();
            }
            self.decision = decision;
        }

        self.phase = Phase::HeadWritten;
        self.inner.write_head(head);
    }

    fn write(&mut self, chunk: &[u8]) {
        match self.phase {
            Phase::Draining | Phase::Closed => {
                debug!("{}: write after end ignored ({} bytes)", self.url(), chunk.len());
                return;
            }
            Phase::Idle => self.implicit_head(),
            Phase::HeadWritten | Phase::Streaming => {}
        }
        self.phase = Phase::Streaming;

        match &mut self.route {
            Route::Passthrough => self.inner.write(chunk),
            Route::Rewrite(pipeline) => {
                if let Err(e) = pipeline.push(chunk, &mut self.inner) {
                    self.fault(e);
                }
            }
        }
    }

    fn end(&mut self) {
        self.end_with(None);
    }
}
