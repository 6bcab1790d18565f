//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered, later ones
//! winning:
//!
//! 1. built-in defaults
//! 2. `{config_dir}/orchestrate.toml` (optional)
//! 3. `{config_dir}/orchestrate.{environment}.toml` (optional)
//! 4. `ORCHESTRATE__SECTION__FIELD` environment variables
//! 5. the legacy `WORKER_SLOTS` variable for `engine.slots`

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestrateConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "ORCHESTRATE";
const ENV_SEPARATOR: &str = "__";
const LEGACY_SLOTS_VAR: &str = "WORKER_SLOTS";

pub struct ConfigManager {
    config: OrchestrateConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_variables(config_dir, environment, None)
    }

    /// Load configuration reading variables from `variables` instead of the process environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_with_variables(
        config_dir: Option<PathBuf>,
        environment: &str,
        variables: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build_config(&config_directory, environment, variables)?;
        config.validate()?;

        info!(
            environment = environment,
            slots = config.engine.slots,
            log_format = %config.logging.format,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &OrchestrateConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// ORCHESTRATE_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("ORCHESTRATE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        variables: Option<HashMap<String, String>>,
    ) -> ConfigResult<OrchestrateConfig> {
        let legacy_slots = match &variables {
            Some(vars) => vars.get(LEGACY_SLOTS_VAR).cloned(),
            None => env::var(LEGACY_SLOTS_VAR).ok(),
        };
        let legacy_slots = legacy_slots
            .map(|raw| Self::parse_slots(&raw))
            .transpose()?;

        let base_file = config_directory.join("orchestrate.toml");
        let env_file = config_directory.join(format!("orchestrate.{environment}.toml"));
        debug!(
            base_file = %base_file.display(),
            base_exists = base_file.exists(),
            env_file = %env_file.display(),
            env_exists = env_file.exists(),
            "Resolved configuration files"
        );

        let config = Config::builder()
            .add_source(Config::try_from(&OrchestrateConfig::default())?)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(variables),
            )
            .set_override_option("engine.slots", legacy_slots)?
            .build()?;

        Ok(config.try_deserialize::<OrchestrateConfig>()?)
    }

    fn parse_slots(raw: &str) -> ConfigResult<i64> {
        raw.trim().parse::<i64>().map_err(|err| {
            ConfigurationError::invalid_value(
                "engine.slots",
                raw,
                format!("{LEGACY_SLOTS_VAR} must be an integer: {err}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::load_with_variables(
            Some(temp_dir.path().to_path_buf()),
            "test",
            vars(&[]),
        )
        .unwrap();

        assert_eq!(manager.config(), &OrchestrateConfig::default());
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config_directory(), temp_dir.path());
    }

    #[test]
    fn test_invalid_legacy_slots() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::load_with_variables(
            Some(temp_dir.path().to_path_buf()),
            "test",
            vars(&[("WORKER_SLOTS", "many")]),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "engine.slots"
        ));
    }

    #[test]
    fn test_file_validation_failure() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("orchestrate.toml"),
            "[engine]\nslots = 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_with_variables(Some(temp_dir.path().to_path_buf()), "test", vars(&[]));
        assert!(result.is_err());
    }
}
