//! Error types for the plugin framework.

use std::sync::Arc;

use anvil_core::{BoxError, ContainerError};
use thiserror::Error;

use crate::state::{PluginState, Stage};

/// A lifecycle step that failed, with the error that caused it.
///
/// Stored on the plugin record (see
/// [`PluginRegistry::last_error`](crate::PluginRegistry::last_error)) and
/// returned to the caller of the failing operation.
#[derive(Debug, Error)]
#[error("plugin '{name}' failed to {stage}: {source}")]
pub struct PluginLifecycleError {
    pub name: String,
    pub stage: Stage,
    #[source]
    pub source: BoxError,
}

impl PluginLifecycleError {
    /// The underlying container error when dependency resolution caused the failure.
    pub fn container_error(&self) -> Option<&ContainerError> {
        self.source.downcast_ref::<ContainerError>()
    }
}

/// Errors returned by [`PluginRegistry`](crate::PluginRegistry) operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A live plugin with this name is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateName(String),

    /// No plugin with this name is registered.
    #[error("plugin '{0}' is not registered")]
    NotFound(String),

    /// The requested operation is not legal in the plugin's current state.
    /// The state is left unchanged.
    #[error("plugin '{name}' cannot go from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: PluginState,
        to: PluginState,
    },

    /// The descriptor targets a plugin API this build does not support.
    #[error("plugin '{name}' targets API {found:#x}, host supports {supported:#x}")]
    Incompatible {
        name: String,
        found: u32,
        supported: u32,
    },

    /// The plugin cannot be removed in its current state.
    #[error("plugin '{name}' cannot be removed while {state}")]
    Busy { name: String, state: PluginState },

    /// A lifecycle step failed; the plugin is now `Failed`.
    #[error(transparent)]
    Lifecycle(Arc<PluginLifecycleError>),
}

impl PluginError {
    /// The lifecycle failure, if this error is one.
    pub fn as_lifecycle(&self) -> Option<&PluginLifecycleError> {
        match self {
            Self::Lifecycle(err) => Some(&**err),
            _ => None,
        }
    }
}

/// Result type for registry operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Result type returned by plugin hooks.
pub type HookResult = Result<(), BoxError>;
