//! # Execution Context
//!
//! A cancellable, deadline-carrying, value-carrying context passed down the
//! handler chain. Deriving a context never mutates its parent: cancellation
//! flows from parent to children through [`CancellationToken`] child tokens,
//! deadlines only ever shrink, and values are layered copy-on-write.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A value stored on a context
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Why a context is done
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<HashMap<String, ContextValue>>,
}

static BACKGROUND: OnceLock<ExecutionContext> = OnceLock::new();

impl ExecutionContext {
    /// A fresh root context: never cancelled unless derived with [`with_cancel`](Self::with_cancel)
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: Arc::new(HashMap::new()),
        }
    }

    /// Process-wide shared root context
    pub fn background_ref() -> &'static ExecutionContext {
        BACKGROUND.get_or_init(ExecutionContext::background)
    }

    /// Derive a context cancelled by the returned token (or by this context)
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.token.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: self.deadline,
            values: Arc::clone(&self.values),
        };
        (ctx, token)
    }

    /// Derive a context expiring after `timeout`
    ///
    /// A timeout too large to be represented as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancellationToken) {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Derive a context expiring at `deadline`, or at this context's deadline if earlier
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancellationToken) {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        let token = self.token.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: Some(deadline),
            values: Arc::clone(&self.values),
        };
        (ctx, token)
    }

    /// Derive a context carrying `value` under `key`
    pub fn with_value(&self, key: impl Into<String>, value: ContextValue) -> Self {
        let mut values = HashMap::clone(&self.values);
        values.insert(key.into(), value);
        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            values: Arc::new(values),
        }
    }

    /// Keep this context's values but take cancellation and deadline from `other`
    pub fn with_signals_of(&self, other: &ExecutionContext) -> Self {
        Self {
            token: other.token.clone(),
            deadline: other.deadline,
            values: Arc::clone(&self.values),
        }
    }

    pub fn value(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `None` while the context is live
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => ContextError::Canceled,
                    _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Canceled
            }
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::background()
    }
}

impl From<CancellationToken> for ExecutionContext {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            values: Arc::new(HashMap::new()),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("values", &keys)
            .finish()
    }
}
