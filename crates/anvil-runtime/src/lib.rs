//! Anvil Runtime: configuration, logging and process bootstrap.
//!
//! This crate provides:
//! - Layered configuration loading with figment ([`ConfigLoader`], [`AnvilConfig`])
//! - `tracing` subscriber setup ([`LoggingBuilder`], [`logging::init_from_config`])
//! - [`AnvilRuntime`], which owns the container, event bus and plugin registry
//!   and drives plugins from startup to shutdown
//!
//! ```ignore
//! use anvil_runtime::AnvilRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AnvilRuntime::new()?;
//!     runtime.register_plugin(my_plugin())?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: the `json` log format

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{AnvilConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{AnvilRuntime, RuntimeBuilder, RuntimeStats, wait_for_shutdown};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for application code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
