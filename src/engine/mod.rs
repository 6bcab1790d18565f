//! # Message-Processing Engine
//!
//! Turns an ordered list of handlers and a stream of inbound messages into a
//! concurrency-bounded, retrying pipeline.
//!
//! ## Building blocks
//!
//! - [`ExecutionContext`]: cancellation, deadline and values for one message
//! - [`TxContext`]: recyclable per-message state and the handler frame stack
//! - [`HandlerFunc`], [`combine_handlers`], [`fork`]: handler composition
//! - [`timeout_handler`]: deadline around a nested handler
//! - [`Engine`]: run loops sharing one capacity pool
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::stream;
//! use orchestrate_core::config::EngineConfig;
//! use orchestrate_core::engine::{handler_fn, Engine, ExecutionContext, Message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder()
//!     .config(EngineConfig::with_slots(10))
//!     .handler(handler_fn(|txctx| {
//!         Box::pin(async move {
//!             txctx.envelope.set_internal_label("stage", "crafted");
//!             txctx.next().await;
//!         })
//!     }))
//!     .build()?;
//!
//! let input = stream::iter(vec![Message::new("tx-crafter", b"{}".to_vec())]);
//! engine.run(&ExecutionContext::background(), input).await?;
//! engine.clean_up();
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod context;
pub mod handler;
pub mod msg;
pub mod pool;
pub mod runtime;
pub mod timeout;
pub mod tx_context;

pub use backoff::{retry_notify, ExponentialBackoff, RetryError};
pub use context::{ContextError, ContextValue, ExecutionContext};
pub use handler::{combine_handlers, fork, handler_fn, HandlerFunc};
pub use msg::{Header, Headers, Message, Msg};
pub use pool::ObjectPool;
pub use runtime::{Engine, EngineBuilder, StopReason};
pub use timeout::timeout_handler;
pub use tx_context::TxContext;
