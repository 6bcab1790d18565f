//! # Transaction Context
//!
//! Per-message mutable state recycled through the engine's context pool.
//!
//! A `TxContext` owns a stack of frames, one per handler list currently
//! executing. [`TxContext::apply_handlers`] is the only way to push a frame
//! and it always pops it again, whether the list completed, was aborted,
//! panicked or was dropped mid-flight by a timeout.
//!
//! Middleware handlers call [`TxContext::next`] to run the remainder of the
//! innermost frame before resuming their own "after" section:
//!
//! ```text
//! [pA, mA, err, mB, pB, abort, pC]
//!  pA -> mA.before -> err -> mB.before -> pB -> abort -> mB.after -> mA.after
//! ```

use crate::engine::context::ExecutionContext;
use crate::engine::handler::HandlerFunc;
use crate::engine::msg::Msg;
use crate::types::envelope::Envelope;
use crate::types::error::TxError;
use futures::future::{self, BoxFuture};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::Span;

/// One frame of the handler stack
pub(crate) struct Sequence {
    handlers: Arc<[HandlerFunc]>,
    /// Next handler to run; only ever moves forward
    index: usize,
}

impl Sequence {
    fn new(handlers: Arc<[HandlerFunc]>) -> Self {
        Self { handlers, index: 0 }
    }

    fn abort(&mut self) {
        self.index = self.handlers.len();
    }

    fn is_exhausted(&self) -> bool {
        self.index >= self.handlers.len()
    }
}

/// Pops every frame above `depth` when dropped
struct FrameGuard<'a> {
    txctx: &'a mut TxContext,
    depth: usize,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.txctx.stack.truncate(self.depth);
    }
}

pub struct TxContext {
    /// Domain payload, including the errors recorded so far
    pub envelope: Envelope,

    /// Span every log line of this message is attached to
    pub logger: Span,

    input: Option<Arc<dyn Msg>>,
    ctx: Option<ExecutionContext>,
    stack: Vec<Sequence>,
}

impl TxContext {
    pub fn new() -> Self {
        Self {
            envelope: Envelope::new(),
            logger: Span::none(),
            input: None,
            ctx: None,
            stack: Vec::new(),
        }
    }

    /// Re-arm a recycled context for a new message
    pub fn prepare(&mut self, logger: Span, input: Option<Arc<dyn Msg>>) -> &mut Self {
        self.reset();
        self.logger = logger;
        self.input = input;
        self
    }

    /// Clear every field; the frame stack keeps its allocation
    pub fn reset(&mut self) {
        self.envelope = Envelope::new();
        self.logger = Span::none();
        self.input = None;
        self.ctx = None;
        self.stack.clear();
    }

    pub fn input(&self) -> Option<&dyn Msg> {
        self.input.as_deref()
    }

    /// Attached execution context, or the shared background context
    pub fn context(&self) -> &ExecutionContext {
        self.ctx
            .as_ref()
            .unwrap_or_else(|| ExecutionContext::background_ref())
    }

    pub fn with_context(&mut self, ctx: ExecutionContext) -> &mut Self {
        self.ctx = Some(ctx);
        self
    }

    /// Store a value for the rest of this message's processing
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        let ctx = self.context().with_value(key, Arc::new(value));
        self.ctx = Some(ctx);
    }

    pub fn get<T>(&self, key: &str) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.context()
            .value(key)
            .and_then(|value| (**value).downcast_ref::<T>())
    }

    /// Record an error on the envelope
    pub fn error(&mut self, err: impl Into<TxError>) -> &mut TxError {
        self.envelope.append_error(err.into())
    }

    /// Exhaust every active frame, innermost first
    pub fn abort(&mut self) {
        for frame in self.stack.iter_mut().rev() {
            frame.abort();
        }
    }

    pub fn abort_with_error(&mut self, err: impl Into<TxError>) -> &mut TxError {
        self.abort();
        self.error(err)
    }

    /// Whether the innermost frame has no handler left to run
    pub fn is_aborted(&self) -> bool {
        self.stack.last().is_some_and(Sequence::is_exhausted)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Run the remaining handlers of the innermost frame
    ///
    /// Outside of any frame this resolves immediately.
    pub fn next(&mut self) -> BoxFuture<'_, ()> {
        match self.stack.len() {
            0 => Box::pin(future::ready(())),
            depth => self.run_sequence(depth - 1),
        }
    }

    /// Push `handlers` as a new frame and run it to completion or abort
    pub fn apply_handlers(&mut self, handlers: Arc<[HandlerFunc]>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let depth = self.stack.len();
            self.stack.push(Sequence::new(handlers));
            let guard = FrameGuard { txctx: self, depth };
            guard.txctx.run_sequence(depth).await;
        })
    }

    fn run_sequence(&mut self, depth: usize) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            while let Some(handler) = self.advance(depth) {
                handler(&mut *self).await;
            }
        })
    }

    fn advance(&mut self, depth: usize) -> Option<HandlerFunc> {
        let frame = self.stack.get_mut(depth)?;
        let handler = frame.handlers.get(frame.index)?.clone();
        frame.index += 1;
        Some(handler)
    }
}

impl Default for TxContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("envelope", &self.envelope)
            .field("entrypoint", &self.input().map(Msg::entrypoint))
            .field("ctx", &self.ctx)
            .field("stack_depth", &self.stack.len())
            .finish()
    }
}
