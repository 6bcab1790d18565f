#![allow(clippy::doc_markdown)] // Allow technical terms like EEA, JSON-RPC in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orchestrate Core
//!
//! Message-processing engine for blockchain transaction orchestration workers.
//!
//! ## Overview
//!
//! Every worker of the orchestration platform (crafter, nonce attributor,
//! signer, sender, listener) is the same program: a stream of inbound
//! messages drained through an ordered chain of handlers. This crate is that
//! program's core. Business steps are plain handlers; the engine sequences
//! them, bounds how many messages are in flight, recycles per-message state
//! and retries messages that failed for transient reasons.
//!
//! ## Architecture
//!
//! - **Handlers** are asynchronous steps over a [`TxContext`](engine::TxContext).
//!   Pipeline handlers do their work and return; middleware handlers call
//!   `next()` to run the rest of the chain and then resume.
//! - **Composition**: [`combine_handlers`](engine::combine_handlers) nests a
//!   sub-chain as a new frame, [`fork`](engine::fork) picks one of several
//!   sub-chains, [`timeout_handler`](engine::timeout_handler) bounds one with
//!   a deadline. `abort()` stops every frame at once while "after" sections of
//!   already-entered middlewares still run.
//! - **Engine**: any number of run loops share one pool of `slots` permits and
//!   one pool of recycled contexts. Failures are data recorded on the
//!   envelope; the most severe one decides between done, retry with
//!   exponential backoff, and stopping the loop.
//!
//! ## Module Organization
//!
//! - [`engine`] - Contexts, handler composition and the run loop
//! - [`handlers`] - Generic loader, logger and producer handlers
//! - [`types`] - Transaction envelope and coded errors
//! - [`config`] - Configuration management
//! - [`error`] - Engine error types
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::stream;
//! use orchestrate_core::config::ConfigManager;
//! use orchestrate_core::engine::{Engine, ExecutionContext, Message};
//! use orchestrate_core::handlers::{loader, logger};
//! use orchestrate_core::logging::init_structured_logging;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! init_structured_logging(&manager.config().logging);
//!
//! let engine = Engine::builder()
//!     .config(manager.config().engine.clone())
//!     .handler(logger("crafter"))
//!     .handler(loader())
//!     .build()?;
//!
//! let input = stream::iter(vec![Message::new("tx-crafter", br#"{"payload":{}}"#.to_vec())]);
//! let reason = engine.run(&ExecutionContext::background(), input).await?;
//! println!("run loop stopped: {reason:?}");
//! engine.clean_up();
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod types;

pub use config::{
    BackoffConfig, ConfigManager, ConfigurationError, EngineConfig, LogFormat, LoggingConfig,
    OrchestrateConfig,
};
pub use engine::{
    combine_handlers, fork, handler_fn, timeout_handler, ContextError, Engine, EngineBuilder,
    ExecutionContext, HandlerFunc, Message, Msg, StopReason, TxContext,
};
pub use error::{EngineError, Result};
pub use types::{Disposition, Envelope, TxError};
