//! Domain-driven configuration management for Warrant
//!
//! Configuration is split by functional domain (authorization scopes,
//! database, logging), loaded from YAML with environment variable
//! overrides, and validated before use.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    auth::{AuthScopeConfig, EntityNames, DEFAULT_SCOPE},
    database::DatabaseConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    WarrantConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
