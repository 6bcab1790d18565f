//! # Timeout Wrapper
//!
//! Bounds the execution of a handler (and, for a middleware, every handler it
//! defers to through `next()`) with a deadline.
//!
//! The wrapped handler runs with a derived context carrying the shorter
//! deadline so nested handlers can observe it. When the deadline passes first
//! the handler's future is dropped at its current suspension point and the
//! timeout message is recorded on the envelope. Work it has not reached yet
//! never runs; a handler that never yields cannot be interrupted.

use crate::engine::handler::{handler_fn, HandlerFunc};
use crate::types::error::TxError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wrap `handler` so that it records `message` as an error when it runs longer than `timeout`
///
/// On expiry the wrapped handler does not keep running in the background:
/// its future is dropped, so nothing it had not done yet happens and the
/// frames it pushed are popped. A timeout too large to be represented adds
/// no deadline.
pub fn timeout_handler(
    handler: HandlerFunc,
    timeout: Duration,
    message: impl Into<String>,
) -> HandlerFunc {
    let message: Arc<str> = Arc::from(message.into());

    handler_fn(move |txctx| {
        let handler = Arc::clone(&handler);
        let message = Arc::clone(&message);

        Box::pin(async move {
            let parent = txctx.context().clone();
            let (deadline_ctx, cancel) = parent.with_timeout(timeout);
            let _cancel_on_exit = cancel.drop_guard();
            txctx.with_context(deadline_ctx.clone());

            let expired = tokio::select! {
                biased;
                _ = handler(&mut *txctx) => None,
                reason = deadline_ctx.done() => Some(reason),
            };

            if let Some(reason) = expired {
                debug!(
                    parent: &txctx.logger,
                    timeout_ms = timeout.as_millis() as u64,
                    reason = %reason,
                    "handler interrupted"
                );
                txctx.error(TxError::internal(message.as_ref()));
            }

            // Values set by the handler survive, the shorter deadline does not
            let restored = txctx.context().with_signals_of(&parent);
            txctx.with_context(restored);
        })
    })
}
