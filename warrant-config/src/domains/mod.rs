//! Domain-specific configuration modules

pub mod auth;
pub mod database;
pub mod logging;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main Warrant configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarrantConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Database configuration
    #[serde(default)]
    pub database: database::DatabaseConfig,

    /// Authorization scopes keyed by name
    #[serde(default = "default_scopes")]
    pub scopes: BTreeMap<String, auth::AuthScopeConfig>,
}

impl Default for WarrantConfig {
    fn default() -> Self {
        Self {
            logging: logging::LoggingConfig::default(),
            database: database::DatabaseConfig::default(),
            scopes: default_scopes(),
        }
    }
}

impl WarrantConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.logging.validate()?;
        self.database.validate()?;

        for (name, scope) in &self.scopes {
            crate::validation::validate_required_string(name, "scope name", "auth")?;
            scope.validate()?;
        }

        Ok(())
    }

    /// Insert the default scope if no scope is configured
    pub fn ensure_default_scope(&mut self) {
        if self.scopes.is_empty() {
            self.scopes = default_scopes();
        }
    }

    /// Settings for a named scope
    pub fn scope(&self, name: &str) -> Option<&auth::AuthScopeConfig> {
        self.scopes.get(name)
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = WarrantConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

fn default_scopes() -> BTreeMap<String, auth::AuthScopeConfig> {
    let mut scopes = BTreeMap::new();
    scopes.insert(auth::DEFAULT_SCOPE.to_string(), auth::AuthScopeConfig::default());
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_main_scope() {
        let config = WarrantConfig::default();
        assert!(config.scope(auth::DEFAULT_SCOPE).is_some());
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_ensure_default_scope() {
        let mut config = WarrantConfig {
            scopes: BTreeMap::new(),
            ..WarrantConfig::default()
        };
        config.ensure_default_scope();
        assert_eq!(config.scopes.len(), 1);
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = WarrantConfig::generate_sample();
        let parsed: WarrantConfig = serde_yaml::from_str(&sample).unwrap();
        assert_eq!(parsed, WarrantConfig::default());
    }
}
