//! Outcome logging middleware.

use crate::engine::handler::{handler_fn, HandlerFunc};
use crate::engine::msg::Msg;
use crate::logging::log_message_operation;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Log entry into the chain, then the duration and errors of every handler after this one
pub fn logger(name: impl Into<String>) -> HandlerFunc {
    let name: Arc<str> = Arc::from(name.into());

    handler_fn(move |txctx| {
        let name = Arc::clone(&name);
        Box::pin(async move {
            let start = Instant::now();
            debug!(parent: &txctx.logger, handler = %name, "message received");

            txctx.next().await;

            let duration_ms = start.elapsed().as_millis() as u64;
            let entrypoint = txctx.input().map(Msg::entrypoint);
            if txctx.envelope.has_errors() {
                let status = if txctx.envelope.only_warnings() {
                    "warning"
                } else {
                    "failed"
                };
                let errors = txctx.envelope.error_string();
                log_message_operation(&name, entrypoint, status, duration_ms, Some(&errors));
                tracing::warn!(
                    parent: &txctx.logger,
                    handler = %name,
                    errors = %errors,
                    "message handled with errors"
                );
            } else {
                log_message_operation(&name, entrypoint, "success", duration_ms, None);
            }
        })
    })
}
