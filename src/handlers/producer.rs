//! Outbound envelope production.

use crate::engine::handler::{handler_fn, HandlerFunc};
use crate::engine::tx_context::TxContext;
use crate::types::error::TxError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "handler.producer";

/// Destination for produced envelopes (a broker producer in production)
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, destination: &str, key: &[u8], payload: Vec<u8>) -> Result<(), TxError>;
}

/// Serialize the envelope and send it where `router` points
///
/// `router` inspects the final context; `None` produces nothing. The inbound
/// key is reused as the outbound key. Send failures are recorded with their
/// own code, so a connection error makes the engine retry the message.
pub fn producer<R>(sink: Arc<dyn MessageSink>, router: R) -> HandlerFunc
where
    R: Fn(&TxContext) -> Option<String> + Send + Sync + 'static,
{
    handler_fn(move |txctx| {
        let destination = router(txctx);
        let sink = Arc::clone(&sink);

        Box::pin(async move {
            let Some(destination) = destination else {
                debug!(parent: &txctx.logger, "no destination, nothing produced");
                return;
            };

            let payload = match txctx.envelope.to_json() {
                Ok(payload) => payload,
                Err(err) => {
                    txctx.error(err).extend_component(COMPONENT);
                    return;
                }
            };
            let key = txctx
                .input()
                .map(|msg| msg.key().to_vec())
                .unwrap_or_default();

            match sink.send(&destination, &key, payload).await {
                Ok(()) => {
                    debug!(parent: &txctx.logger, destination = %destination, "envelope produced");
                }
                Err(err) => {
                    txctx.error(err).extend_component(COMPONENT);
                }
            }
        })
    })
}
