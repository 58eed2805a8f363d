//! Runtime error types.

use anvil_core::{BusError, ContainerError, DisposeError};
use anvil_framework::PluginError;
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// One or more singletons failed to tear down during shutdown.
    #[error(transparent)]
    Dispose(#[from] DisposeError),

    #[error("failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
