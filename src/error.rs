//! # Engine Error Types
//!
//! Errors surfaced by the per-message processing step back to the engine's
//! retry loop. Domain errors recorded by handlers are [`TxError`] values kept
//! on the envelope; only the ones that decide the fate of a message are
//! lifted into an [`EngineError`].

use crate::engine::context::ContextError;
use crate::types::error::TxError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The loop context was cancelled or expired while a message was in flight
    #[error("{0}")]
    Context(#[from] ContextError),

    /// A handler recorded a transient error; the message should be retried
    #[error("Retryable processing error: {0}")]
    Retryable(TxError),

    /// A handler recorded an error that must stop the consumer loop
    #[error("Fatal processing error: {0}")]
    Fatal(TxError),
}

impl EngineError {
    /// Whether the error came from loop cancellation rather than a handler
    pub fn is_context(&self) -> bool {
        matches!(self, EngineError::Context(_))
    }

    /// The handler error behind this failure, if any
    pub fn tx_error(&self) -> Option<&TxError> {
        match self {
            EngineError::Retryable(err) | EngineError::Fatal(err) => Some(err),
            EngineError::Context(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
