//! Logging initialisation for Warrant
//!
//! Library crates log through `tracing` macros only; binaries and tests call
//! one of the initialisers here to install a subscriber.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing, init_test_tracing};
pub use warrant_config::{LogFormat, LogLevel, LoggingConfig};
