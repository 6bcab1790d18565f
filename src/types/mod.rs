//! Domain types carried through the engine: the transaction envelope and
//! its coded errors.

pub mod envelope;
pub mod error;

pub use envelope::Envelope;
pub use error::{codes, is_error_class, Disposition, TxError};
