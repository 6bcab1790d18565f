//! # Engine
//!
//! Drains message streams through the registered handler chain.
//!
//! Any number of [`Engine::run`] loops, each consuming its own stream, may be
//! active at once. They share one capacity pool of `slots` permits, so at most
//! `slots` messages are inside a handler chain at any instant, and one pool of
//! recycled [`TxContext`]s.
//!
//! For every message a loop acquires a permit, runs the main chain then the
//! wrapper chain on a recycled context, and classifies the most severe error
//! recorded on the envelope:
//!
//! | Disposition | Outcome |
//! |---|---|
//! | none / `Skip` | message done |
//! | `Retry` | retried with exponential backoff, the permit is held meanwhile |
//! | `Stop` | loop exits with [`EngineError::Fatal`] |
//!
//! Cancellation of the loop context always wins: the loop exits with
//! [`StopReason::Cancelled`] once the in-flight message is done.

use crate::config::{ConfigurationError, EngineConfig};
use crate::engine::backoff::{retry_notify, ExponentialBackoff, RetryError};
use crate::engine::context::ExecutionContext;
use crate::engine::handler::HandlerFunc;
use crate::engine::msg::Msg;
use crate::engine::pool::ObjectPool;
use crate::engine::tx_context::TxContext;
use crate::error::EngineError;
use crate::logging::log_error;
use crate::types::error::Disposition;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Once};
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};

/// Why a run loop returned normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The input stream ended
    InputClosed,
    /// The loop context was cancelled or expired
    Cancelled,
}

type ContextPool = ObjectPool<Box<TxContext>>;

/// Upper bound on idle contexts kept for reuse; more slots still get fresh ones
const MAX_POOLED_CONTEXTS: usize = 1024;

#[derive(Default)]
struct EngineState {
    config: Option<EngineConfig>,
    handlers: Vec<HandlerFunc>,
    wrapper_handlers: Vec<HandlerFunc>,
    slots: Option<Arc<Semaphore>>,
    ctx_pool: Option<Arc<ContextPool>>,
}

/// Snapshot of the engine state taken when a loop starts
struct LoopResources {
    config: EngineConfig,
    handlers: Arc<[HandlerFunc]>,
    wrapper_handlers: Arc<[HandlerFunc]>,
    slots: Arc<Semaphore>,
    ctx_pool: Arc<ContextPool>,
}

pub struct Engine {
    state: Mutex<EngineState>,
    running: AtomicI64,
    clean_once: Once,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            running: AtomicI64::new(0),
            clean_once: Once::new(),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Validate and store the engine configuration
    pub fn set_config(&self, config: EngineConfig) -> Result<(), ConfigurationError> {
        config.validate()?;
        self.state.lock().config = Some(config);
        Ok(())
    }

    /// Append a handler to the main chain
    pub fn register(&self, handler: HandlerFunc) {
        self.state.lock().handlers.push(handler);
    }

    /// Append a handler to the chain run after the main one for every message
    pub fn register_wrapper(&self, handler: HandlerFunc) {
        self.state.lock().wrapper_handlers.push(handler);
    }

    /// Number of active run loops
    pub fn running_loops(&self) -> i64 {
        self.running.load(Ordering::SeqCst)
    }

    /// Consume `input` until it ends or `ctx` is done
    ///
    /// Handlers registered after the loop started are not picked up by it.
    ///
    /// # Errors
    ///
    /// Returns the handler error that stopped the loop: a fatal error, or a
    /// retryable one whose retry budget is exhausted.
    ///
    /// # Panics
    ///
    /// Panics if no configuration was set, or if [`clean_up`](Self::clean_up)
    /// closed the capacity pool while the loop was running.
    pub async fn run<S, M>(
        &self,
        ctx: &ExecutionContext,
        mut input: S,
    ) -> Result<StopReason, EngineError>
    where
        S: Stream<Item = M> + Unpin,
        M: Msg + 'static,
    {
        let resources = self.loop_resources();

        let count = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(loops.count = count, "engine: start running loop");

        let result = self.consume(ctx, &mut input, &resources).await;

        let count = self.running.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(loops.count = count, "engine: left running loop");
        result
    }

    /// Close the capacity pool; only the first call has an effect
    ///
    /// Call it once every run loop has returned.
    pub fn clean_up(&self) {
        self.clean_once.call_once(|| {
            let mut state = self.state.lock();
            if let Some(slots) = state.slots.take() {
                slots.close();
            }
            state.ctx_pool = None;
            debug!("engine: capacity pool released");
        });
    }

    fn loop_resources(&self) -> LoopResources {
        let mut state = self.state.lock();
        let config = match &state.config {
            Some(config) => config.clone(),
            None => panic!("engine has no configuration (call set_config() before run())"),
        };

        let slots = Arc::clone(
            state
                .slots
                .get_or_insert_with(|| Arc::new(Semaphore::new(config.slots))),
        );
        let ctx_pool = Arc::clone(state.ctx_pool.get_or_insert_with(|| {
            Arc::new(ObjectPool::new(
                config.slots.min(MAX_POOLED_CONTEXTS),
                || Box::new(TxContext::new()),
            ))
        }));

        LoopResources {
            handlers: state.handlers.iter().cloned().collect(),
            wrapper_handlers: state.wrapper_handlers.iter().cloned().collect(),
            config,
            slots,
            ctx_pool,
        }
    }

    async fn consume<S, M>(
        &self,
        ctx: &ExecutionContext,
        input: &mut S,
        resources: &LoopResources,
    ) -> Result<StopReason, EngineError>
    where
        S: Stream<Item = M> + Unpin,
        M: Msg + 'static,
    {
        let mut backoff = ExponentialBackoff::from_config(&resources.config.backoff);

        loop {
            let msg = tokio::select! {
                biased;
                _ = ctx.done() => return Ok(StopReason::Cancelled),
                next = input.next() => match next {
                    Some(msg) => msg,
                    None => return Ok(StopReason::InputClosed),
                },
            };
            let msg: Arc<dyn Msg> = Arc::new(msg);

            let permit = match Arc::clone(&resources.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => panic!("engine capacity pool closed while running (call clean_up() after every run() returned)"),
            };

            let key = String::from_utf8_lossy(msg.key()).into_owned();
            let outcome = retry_notify(
                &mut backoff,
                ctx,
                || self.handle_message(ctx, resources, Arc::clone(&msg)),
                |err, wait| {
                    warn!(
                        key = %key,
                        error = %err,
                        retry_in_ms = wait.as_millis() as u64,
                        "error processing message, retrying"
                    );
                },
            )
            .await;
            drop(permit);

            match outcome {
                Ok(()) => {}
                Err(EngineError::Context(reason)) => {
                    info!(reason = %reason, "exiting listener session");
                    return Ok(StopReason::Cancelled);
                }
                Err(err) => {
                    log_error(
                        "engine",
                        "handle_message",
                        &err.to_string(),
                        Some(&format!("key={key}")),
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn handle_message(
        &self,
        ctx: &ExecutionContext,
        resources: &LoopResources,
        msg: Arc<dyn Msg>,
    ) -> Result<(), RetryError<EngineError>> {
        let mut txctx = resources.ctx_pool.get();

        let span = info_span!(
            "engine.message",
            entrypoint = %msg.entrypoint(),
            key = %String::from_utf8_lossy(msg.key()),
        );
        txctx
            .prepare(span.clone(), Some(msg))
            .with_context(ctx.clone());

        async {
            txctx
                .apply_handlers(Arc::clone(&resources.handlers))
                .await;
            txctx
                .apply_handlers(Arc::clone(&resources.wrapper_handlers))
                .await;
        }
        .instrument(span)
        .await;

        // Copied out before the context goes back to the pool
        let most_severe = txctx.envelope.most_severe_error().cloned();
        txctx.reset();
        resources.ctx_pool.put(txctx);

        if let Some(reason) = ctx.err() {
            return Err(RetryError::permanent(EngineError::Context(reason)));
        }

        match most_severe {
            Some(err) => match err.disposition() {
                Disposition::Retry => Err(RetryError::transient(EngineError::Retryable(err))),
                Disposition::Stop => Err(RetryError::permanent(EngineError::Fatal(err))),
                Disposition::Skip => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Engine")
            .field("config", &state.config)
            .field("handlers", &state.handlers.len())
            .field("wrapper_handlers", &state.wrapper_handlers.len())
            .field("running", &self.running_loops())
            .finish()
    }
}

/// Builder assembling an [`Engine`] from its configuration and handler chains
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    handlers: Vec<HandlerFunc>,
    wrapper_handlers: Vec<HandlerFunc>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn handler(mut self, handler: HandlerFunc) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers<I>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = HandlerFunc>,
    {
        self.handlers.extend(handlers);
        self
    }

    pub fn wrapper(mut self, handler: HandlerFunc) -> Self {
        self.wrapper_handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<Engine, ConfigurationError> {
        let engine = Engine::new();
        if let Some(config) = self.config {
            engine.set_config(config)?;
        }
        {
            let mut state = engine.state.lock();
            state.handlers = self.handlers;
            state.wrapper_handlers = self.wrapper_handlers;
        }
        Ok(engine)
    }
}
