//! Inbound message decoding.

use crate::engine::handler::{handler_fn, HandlerFunc};
use crate::engine::tx_context::TxContext;
use crate::types::envelope::Envelope;
use crate::types::error::TxError;
use tracing::debug;

const COMPONENT: &str = "handler.loader";

/// Decode the inbound message value (JSON) into the envelope
///
/// Inbound headers are copied onto the envelope and an identifier is
/// assigned when the message carries none. Malformed input aborts the chain
/// with an encoding error.
pub fn loader() -> HandlerFunc {
    handler_fn(|txctx| {
        if let Err(err) = load(txctx) {
            txctx.abort_with_error(err).extend_component(COMPONENT);
        }
        Box::pin(async {})
    })
}

fn load(txctx: &mut TxContext) -> Result<(), TxError> {
    let input = txctx
        .input()
        .ok_or_else(|| TxError::invalid_state("no inbound message attached"))?;

    let mut envelope = Envelope::from_json(input.value())?;
    let header = input.header();
    for key in header.keys() {
        if let Some(value) = header.get(&key) {
            envelope.set_header(key, value);
        }
    }
    let id = envelope.ensure_id();

    // Keep what earlier handlers already recorded
    envelope.append_errors(txctx.envelope.errors().iter().cloned());
    txctx.envelope = envelope;

    debug!(parent: &txctx.logger, envelope_id = %id, "envelope loaded");
    Ok(())
}
