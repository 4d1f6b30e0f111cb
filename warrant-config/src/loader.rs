//! Configuration loading and environment variable handling

use crate::domains::WarrantConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "WARRANT".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<WarrantConfig> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<WarrantConfig> {
        let mut config: WarrantConfig = serde_yaml::from_str(content)?;
        config.ensure_default_scope();

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<WarrantConfig> {
        let mut config = WarrantConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<WarrantConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut WarrantConfig) -> ConfigResult<()> {
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_database_overrides(&mut config.database)?;

        if let Ok(force) = self.get_env_var("FORCE_CONTEXT") {
            let force: bool = force
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid FORCE_CONTEXT: {}", e)))?;
            for scope in config.scopes.values_mut() {
                scope.force_context = force;
            }
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = log_level
                .parse()
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = format
                .parse()
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Apply database config overrides
    fn apply_database_overrides(
        &self,
        config: &mut crate::domains::database::DatabaseConfig,
    ) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("DATABASE_URL") {
            config.url = url;
        }

        if let Ok(max) = self.get_env_var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", e))
            })?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
