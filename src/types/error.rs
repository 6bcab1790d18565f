//! # Transaction Error Types
//!
//! Domain errors recorded by handlers on a message's envelope.
//!
//! Codes are 5-nibble hexadecimal values read as `CC S NN`: a 2-nibble class,
//! a 1-nibble subclass and a 2-nibble code. Class membership is decided on
//! those nibbles, which is also what drives the engine's retry decision
//! (see [`Disposition`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes, grouped by class
pub mod codes {
    // Warnings (class 01XXX)
    pub const WARNING: u64 = 1 << 12;
    pub const FAUCET: u64 = WARNING + (2 << 8);
    pub const INVALID_NONCE: u64 = WARNING + (3 << 8);
    pub const INVALID_NONCE_TOO_HIGH: u64 = INVALID_NONCE + 1;
    pub const INVALID_NONCE_TOO_LOW: u64 = INVALID_NONCE + 2;

    // Connection errors (class 08XXX)
    pub const CONNECTION: u64 = 8 << 12;
    pub const KAFKA_CONNECTION: u64 = CONNECTION + (1 << 8);
    pub const HTTP_CONNECTION: u64 = CONNECTION + (2 << 8);
    pub const ETH_CONNECTION: u64 = CONNECTION + (3 << 8);
    pub const REDIS_CONNECTION: u64 = CONNECTION + (5 << 8);
    pub const POSTGRES_CONNECTION: u64 = CONNECTION + (6 << 8);
    pub const SERVICE_CONNECTION: u64 = CONNECTION + (7 << 8);

    // Authentication errors (class 09XXX)
    pub const INVALID_AUTHENTICATION: u64 = 9 << 12;
    pub const UNAUTHORIZED: u64 = INVALID_AUTHENTICATION + 1;
    pub const PERMISSION_DENIED: u64 = INVALID_AUTHENTICATION + 2;

    // Feature not supported (class 0AXXX)
    pub const FEATURE_NOT_SUPPORTED: u64 = 10 << 12;

    // Invalid state (class 24XXX)
    pub const INVALID_STATE: u64 = (2 << 16) + (4 << 12);
    pub const CONFLICTED: u64 = INVALID_STATE + (2 << 8);

    // Data errors (class 42XXX)
    pub const DATA: u64 = (4 << 16) + (2 << 12);
    pub const ENCODING: u64 = DATA + (1 << 8);
    pub const SOLIDITY: u64 = DATA + (2 << 8);
    pub const INVALID_SIGNATURE: u64 = SOLIDITY + 1;
    pub const INVALID_ARGS_COUNT: u64 = SOLIDITY + 2;
    pub const INVALID_ARG: u64 = SOLIDITY + 3;
    pub const INVALID_TOPICS_COUNT: u64 = SOLIDITY + 4;
    pub const INVALID_LOG: u64 = SOLIDITY + 5;
    pub const INVALID_FORMAT: u64 = DATA + (3 << 8);
    pub const INVALID_PARAMETER: u64 = DATA + (4 << 8);

    // Ethereum errors (class BEXXX)
    pub const ETHEREUM: u64 = (11 << 16) + (14 << 12);
    pub const NONCE_TOO_LOW: u64 = ETHEREUM + 1;
    pub const INVALID_NONCE_ERR: u64 = ETHEREUM + 2;

    // Cryptographic operation errors (class C0XXX)
    pub const CRYPTO_OPERATION: u64 = 12 << 16;
    pub const INVALID_CRYPTOGRAPHIC_SIGNATURE: u64 = CRYPTO_OPERATION + 1;

    // Storage errors (class DBXXX)
    pub const STORAGE: u64 = (13 << 16) + (11 << 12);
    pub const CONSTRAINT_VIOLATED: u64 = STORAGE + (1 << 8);
    pub const ALREADY_EXISTS: u64 = CONSTRAINT_VIOLATED + 1;
    pub const NOT_FOUND: u64 = STORAGE + (2 << 8);

    // Configuration errors (class F0XXX)
    pub const CONFIG: u64 = 15 << 16;

    // Internal errors (class FFXXX)
    pub const INTERNAL: u64 = (15 << 16) + (15 << 12);
    pub const DATA_CORRUPTED: u64 = INTERNAL + (1 << 8);
    pub const DEPENDENCY_FAILURE: u64 = INTERNAL + (2 << 8);
}

/// Whether `code` belongs to the class (or subclass, or exact code) `class`
pub fn is_error_class(code: u64, class: u64) -> bool {
    let trailing_nibbles = (class.trailing_zeros() / 4).min(3);
    let shift = trailing_nibbles * 4;
    code >> shift == class >> shift
}

/// What the engine does with a message once a given error has been recorded
///
/// Ordered by severity: when several errors are recorded on one message the
/// most severe one decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Permanent for this message: processing is done, errors travel on the envelope
    Skip,
    /// Transient: the whole handler chain is replayed with backoff
    Retry,
    /// Permanent for the consumer: the running loop exits
    Stop,
}

impl Disposition {
    /// Classify an error code
    pub fn of(code: u64) -> Self {
        if is_error_class(code, codes::CONNECTION) {
            Disposition::Retry
        } else if is_error_class(code, codes::CONFIG) {
            Disposition::Stop
        } else {
            Disposition::Skip
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Skip => write!(f, "skip"),
            Disposition::Retry => write!(f, "retry"),
            Disposition::Stop => write!(f, "stop"),
        }
    }
}

/// A coded error recorded while processing a transaction message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxError {
    code: u64,
    message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    component: String,
}

impl TxError {
    pub fn new(code: u64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            component: String::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(codes::WARNING, message)
    }

    pub fn faucet_warning(message: impl Into<String>) -> Self {
        Self::new(codes::FAUCET, message)
    }

    pub fn invalid_nonce_warning(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_NONCE, message)
    }

    pub fn nonce_too_high_warning(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_NONCE_TOO_HIGH, message)
    }

    pub fn nonce_too_low_warning(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_NONCE_TOO_LOW, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(codes::CONNECTION, message)
    }

    pub fn kafka_connection(message: impl Into<String>) -> Self {
        Self::new(codes::KAFKA_CONNECTION, message)
    }

    pub fn http_connection(message: impl Into<String>) -> Self {
        Self::new(codes::HTTP_CONNECTION, message)
    }

    pub fn eth_connection(message: impl Into<String>) -> Self {
        Self::new(codes::ETH_CONNECTION, message)
    }

    pub fn service_connection(message: impl Into<String>) -> Self {
        Self::new(codes::SERVICE_CONNECTION, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(codes::UNAUTHORIZED, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(codes::PERMISSION_DENIED, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_STATE, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(codes::DATA, message)
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(codes::ENCODING, message)
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_FORMAT, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMETER, message)
    }

    pub fn nonce_too_low(message: impl Into<String>) -> Self {
        Self::new(codes::NONCE_TOO_LOW, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(codes::ALREADY_EXISTS, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(codes::CONFIG, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    pub fn dependency_failure(message: impl Into<String>) -> Self {
        Self::new(codes::DEPENDENCY_FAILURE, message)
    }

    /// Normalise any error: a `TxError` is kept as is, anything else becomes
    /// an internal error carrying its message
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        match err.downcast_ref::<TxError>() {
            Some(tx_err) => tx_err.clone(),
            None => Self::internal(err.to_string()),
        }
    }

    pub fn code(&self) -> u64 {
        self.code
    }

    /// Code formatted as 5 hexadecimal digits (e.g. `08300`)
    pub fn hex_code(&self) -> String {
        format!("{:05X}", self.code)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Prefix the component path, `a` then `b` gives `b.a`
    pub fn extend_component(&mut self, component: &str) -> &mut Self {
        if self.component.is_empty() {
            self.component = component.to_string();
        } else {
            self.component = format!("{}.{}", component, self.component);
        }
        self
    }

    pub fn with_component(mut self, component: &str) -> Self {
        self.extend_component(component);
        self
    }

    pub fn is_class(&self, class: u64) -> bool {
        is_error_class(self.code, class)
    }

    pub fn is_warning(&self) -> bool {
        self.is_class(codes::WARNING)
    }

    pub fn is_connection_error(&self) -> bool {
        self.is_class(codes::CONNECTION)
    }

    pub fn is_invalid_nonce_warning(&self) -> bool {
        self.is_class(codes::INVALID_NONCE)
    }

    pub fn is_data_error(&self) -> bool {
        self.is_class(codes::DATA)
    }

    pub fn is_config_error(&self) -> bool {
        self.is_class(codes::CONFIG)
    }

    pub fn is_internal_error(&self) -> bool {
        self.is_class(codes::INTERNAL)
    }

    pub fn disposition(&self) -> Disposition {
        Disposition::of(self.code)
    }
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.component.is_empty() {
            write!(f, "{:05X}: {}", self.code, self.message)
        } else {
            write!(f, "{:05X}@{}: {}", self.code, self.component, self.message)
        }
    }
}

impl std::error::Error for TxError {}

impl From<anyhow::Error> for TxError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<TxError>() {
            Some(tx_err) => tx_err.clone(),
            None => TxError::internal(err.to_string()),
        }
    }
}

impl From<String> for TxError {
    fn from(message: String) -> Self {
        TxError::internal(message)
    }
}

impl From<&str> for TxError {
    fn from(message: &str) -> Self {
        TxError::internal(message)
    }
}

impl From<std::io::Error> for TxError {
    fn from(err: std::io::Error) -> Self {
        TxError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for TxError {
    fn from(err: serde_json::Error) -> Self {
        TxError::encoding(err.to_string())
    }
}
