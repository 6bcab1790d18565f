//! # Generic Handlers
//!
//! Transport-agnostic handlers most workers place around their business
//! chain:
//!
//! - [`loader`]: decodes the inbound message into the envelope
//! - [`logger`]: middleware logging the outcome of everything after it
//! - [`producer`]: serializes the final envelope to a [`MessageSink`]
//!
//! A typical chain is `[logger("crafter"), loader(), <business>, producer(..)]`.

pub mod loader;
pub mod logger;
pub mod producer;

pub use loader::loader;
pub use logger::logger;
pub use producer::{producer, MessageSink};
