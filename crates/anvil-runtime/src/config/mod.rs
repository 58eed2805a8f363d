//! Layered configuration for the Anvil runtime.
//!
//! Sources are merged with figment: built-in defaults, programmatic
//! overrides, the configuration file (and its profile variant), then
//! `ANVIL_*` environment variables.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AnvilConfig, BusConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
