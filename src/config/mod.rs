//! # Engine Configuration
//!
//! Typed configuration for the message-processing engine and the process
//! around it. Every field has a default so an empty configuration is valid;
//! [`ConfigManager`] layers files and environment variables on top.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orchestrate_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let slots = manager.config().engine.slots;
//! # let _ = slots;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::Semaphore;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrateConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl OrchestrateConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.logging.validate()
    }
}

/// Message-processing engine settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of messages processed at once across every run loop
    pub slots: usize,

    /// Retry policy wrapped around each message
    pub backoff: BackoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slots: 100,
            backoff: BackoffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.slots == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.slots",
                "0",
                "slots must be greater than 0",
            ));
        }

        if self.slots > Semaphore::MAX_PERMITS {
            return Err(ConfigurationError::invalid_value(
                "engine.slots",
                self.slots.to_string(),
                format!("slots must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        self.backoff.validate()
    }
}

/// Exponential backoff between attempts on the same message
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_interval_ms: u64,
    pub randomization_factor: f64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    /// Total retry budget per message; 0 retries forever
    pub max_elapsed_time_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            randomization_factor: 0.5,
            multiplier: 1.5,
            max_interval_ms: 15_000,
            max_elapsed_time_ms: 300_000,
        }
    }
}

impl BackoffConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.backoff.initial_interval_ms",
                "0",
                "initial interval must be greater than 0",
            ));
        }

        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "engine.backoff.multiplier",
                self.multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(ConfigurationError::invalid_value(
                "engine.backoff.randomization_factor",
                self.randomization_factor.to_string(),
                "randomization factor must be between 0.0 and 1.0",
            ));
        }

        if self.max_interval_ms < self.initial_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "engine.backoff.max_interval_ms",
                self.max_interval_ms.to_string(),
                "max interval must not be shorter than the initial interval",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`info`, `orchestrate_core=debug`); the environment decides when unset
    pub level: Option<String>,
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        match self.level.as_deref() {
            Some(level) if level.trim().is_empty() => Err(ConfigurationError::invalid_value(
                "logging.level",
                level,
                "log level must not be blank",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestrateConfig::default();
        assert_eq!(config.engine.slots, 100);
        assert_eq!(config.engine.backoff.initial_interval(), Duration::from_millis(500));
        assert_eq!(config.engine.backoff.max_interval(), Duration::from_secs(15));
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_slots_rejected() {
        let err = EngineConfig::with_slots(0).validate().unwrap_err();
        assert_eq!(err.field(), Some("engine.slots"));
    }

    #[test]
    fn test_slots_above_semaphore_limit_rejected() {
        assert!(EngineConfig::with_slots(Semaphore::MAX_PERMITS).validate().is_ok());

        let err = EngineConfig::with_slots(Semaphore::MAX_PERMITS + 1)
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("engine.slots"));
    }

    #[test]
    fn test_backoff_validation() {
        let invalid = [
            BackoffConfig {
                initial_interval_ms: 0,
                ..BackoffConfig::default()
            },
            BackoffConfig {
                multiplier: 0.5,
                ..BackoffConfig::default()
            },
            BackoffConfig {
                randomization_factor: 1.5,
                ..BackoffConfig::default()
            },
            BackoffConfig {
                max_interval_ms: 100,
                ..BackoffConfig::default()
            },
        ];
        for config in invalid {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_blank_log_level_rejected() {
        let config = LoggingConfig {
            level: Some("  ".to_string()),
            format: LogFormat::Json,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: OrchestrateConfig =
            serde_json::from_str(r#"{"engine":{"slots":8},"logging":{"format":"json"}}"#).unwrap();
        assert_eq!(config.engine.slots, 8);
        assert_eq!(config.engine.backoff, BackoffConfig::default());
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
