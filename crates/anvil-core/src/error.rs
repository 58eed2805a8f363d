//! Error types for the service container and the event bus.
//!
//! Factory, teardown and handler failures are carried as [`BoxError`] so that
//! user code can return any error type; the container and bus wrap them with
//! the key or subscription that produced them.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::container::ServiceKey;

/// Boxed error returned by user-supplied factories, teardown hooks and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Container Errors
// =============================================================================

/// Errors raised while registering or resolving services.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A registration already exists under this key.
    #[error("service '{0}' is already registered")]
    DuplicateKey(ServiceKey),

    /// No registration exists under this key.
    #[error("service '{key}' is not registered{}", required_by_suffix(.required_by.as_ref()))]
    UnknownService {
        /// The missing key.
        key: ServiceKey,
        /// The service whose declared dependency pointed at the missing key.
        required_by: Option<ServiceKey>,
    },

    /// The declared dependencies form a cycle.
    ///
    /// `path` starts and ends with the same key, e.g. `[A, B, A]`.
    #[error("circular dependency: {}", join_path(.path))]
    CircularDependency {
        /// The keys along the cycle.
        path: Vec<ServiceKey>,
    },

    /// The resolved instance is not of the requested type.
    #[error("service '{key}' is not a `{expected}`")]
    TypeMismatch {
        /// The key that was resolved.
        key: ServiceKey,
        /// The type the caller asked for.
        expected: &'static str,
    },

    /// The factory for this key returned an error.
    #[error("factory for service '{key}' failed: {source}")]
    FactoryFailed {
        /// The key whose factory failed.
        key: ServiceKey,
        /// The factory's error.
        #[source]
        source: BoxError,
    },
}

impl ContainerError {
    /// Returns the key this error is about, if any.
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            Self::DuplicateKey(key)
            | Self::UnknownService { key, .. }
            | Self::TypeMismatch { key, .. }
            | Self::FactoryFailed { key, .. } => Some(key),
            Self::CircularDependency { path } => path.first(),
        }
    }
}

fn required_by_suffix(required_by: Option<&ServiceKey>) -> String {
    required_by
        .map(|parent| format!(" (required by '{parent}')"))
        .unwrap_or_default()
}

fn join_path(path: &[ServiceKey]) -> String {
    path.iter()
        .map(ServiceKey::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Aggregated teardown failures from [`Container::dispose`](crate::Container::dispose).
///
/// Disposal never stops at the first failing hook; every failure is kept here
/// in the order the hooks ran.
#[derive(Debug, Error)]
#[error("{} teardown hook(s) failed: {}", .failures.len(), summarize(.failures))]
pub struct DisposeError {
    /// Failing keys paired with the error their teardown returned.
    pub failures: Vec<(ServiceKey, BoxError)>,
}

impl DisposeError {
    /// Keys whose teardown failed.
    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.failures.iter().map(|(key, _)| key)
    }
}

fn summarize(failures: &[(ServiceKey, BoxError)]) -> String {
    failures
        .iter()
        .map(|(key, err)| format!("{key}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Bus Errors
// =============================================================================

/// Errors raised by [`EventBus::subscribe`](crate::EventBus::subscribe).
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The subscription request cannot be honoured.
    #[error("invalid handler for topic '{topic}': {reason}")]
    InvalidHandler {
        /// Topic the handler was subscribed to.
        topic: String,
        /// Why the handler was rejected.
        reason: &'static str,
    },
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// Panics
// =============================================================================

/// A panic caught at a user-code boundary, turned into an ordinary error.
#[derive(Debug, Clone)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Builds the error from a payload returned by `catch_unwind`.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panicked: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = ContainerError::CircularDependency {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "circular dependency: A -> B -> A");
        assert_eq!(err.key().map(ServiceKey::as_str), Some("A"));
    }

    #[test]
    fn test_unknown_service_display() {
        let bare = ContainerError::UnknownService {
            key: "X".into(),
            required_by: None,
        };
        assert_eq!(bare.to_string(), "service 'X' is not registered");

        let nested = ContainerError::UnknownService {
            key: "X".into(),
            required_by: Some("B".into()),
        };
        assert_eq!(
            nested.to_string(),
            "service 'X' is not registered (required by 'B')"
        );
    }

    #[test]
    fn test_panic_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(PanicError::from_payload(caught).message(), "boom");

        let caught = std::panic::catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(
            PanicError::from_payload(caught).to_string(),
            "panicked: formatted 1"
        );
    }
}
