//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unsupported or disabled configuration format: .{extension}")]
    UnsupportedFormat { extension: String },

    /// A source could not be parsed, or the merged result does not fit the schema.
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] figment::Error),

    #[error("invalid configuration: {message}")]
    Validation { message: String },

    #[error("missing required configuration field: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
