use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::ServiceKey;
use crate::error::{BoxError, ContainerError, ContainerResult};

/// A type-erased service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFactory =
    Arc<dyn Fn(&Dependencies) -> Result<Instance, BoxError> + Send + Sync>;

pub(crate) type ErasedTeardown = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// How often a registration's factory runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// At most one instance per container, created on first resolution.
    Singleton,
    /// A fresh instance on every resolution. Never cached, never disposed.
    Transient,
}

/// Cleanup hook for singletons, invoked by [`Container::dispose`](super::Container::dispose).
pub trait Dispose: Send + Sync + 'static {
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Downcasts an erased instance, reporting the key on mismatch.
pub(crate) fn downcast<T: Send + Sync + 'static>(
    key: &ServiceKey,
    instance: Instance,
) -> ContainerResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            key: key.clone(),
            expected: type_name::<T>(),
        })
}

// =============================================================================
// Registration
// =============================================================================

/// Describes how to build one service.
///
/// Built with [`Registration::singleton`], [`Registration::transient`] or
/// [`Registration::instance`] and handed to [`Container::add`](super::Container::add):
///
/// ```rust,ignore
/// container.add(
///     Registration::singleton("Service", |deps| {
///         Ok(Service::new(deps.get::<Logger>("Logger")?))
///     })
///     .depends_on(["Logger"]),
/// )?;
/// ```
pub struct Registration<T> {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) dependencies: Vec<ServiceKey>,
    pub(crate) factory: ErasedFactory,
    pub(crate) teardown: Option<ErasedTeardown>,
    pub(crate) prebuilt: Option<Instance>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Registration<T> {
    /// Creates a registration with an explicit lifetime.
    pub fn new<F>(key: impl Into<ServiceKey>, lifetime: Lifetime, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            lifetime,
            dependencies: Vec::new(),
            factory: Arc::new(move |deps: &Dependencies| {
                factory(deps).map(|value| Arc::new(value) as Instance)
            }),
            teardown: None,
            prebuilt: None,
            _marker: PhantomData,
        }
    }

    pub fn singleton<F>(key: impl Into<ServiceKey>, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(key, Lifetime::Singleton, factory)
    }

    pub fn transient<F>(key: impl Into<ServiceKey>, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(key, Lifetime::Transient, factory)
    }

    /// Wraps an already-built value as a singleton.
    ///
    /// The value counts as created when it is added, so it takes part in
    /// disposal order from that point on.
    pub fn instance(key: impl Into<ServiceKey>, value: T) -> Self {
        let instance: Instance = Arc::new(value);
        let shared = Arc::clone(&instance);
        Self {
            key: key.into(),
            lifetime: Lifetime::Singleton,
            dependencies: Vec::new(),
            factory: Arc::new(move |_: &Dependencies| Ok(Arc::clone(&shared))),
            teardown: None,
            prebuilt: Some(instance),
            _marker: PhantomData,
        }
    }

    /// Declares the keys resolved and handed to the factory, in order.
    pub fn depends_on<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ServiceKey>,
    {
        self.dependencies.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sets a teardown hook run by `dispose` for the cached singleton.
    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let key = self.key.clone();
        self.teardown = Some(Arc::new(move |instance: &Instance| {
            let value = instance
                .downcast_ref::<T>()
                .ok_or_else(|| ContainerError::TypeMismatch {
                    key: key.clone(),
                    expected: type_name::<T>(),
                })?;
            teardown(value)
        }));
        self
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn dependencies(&self) -> &[ServiceKey] {
        &self.dependencies
    }
}

impl<T: Dispose> Registration<T> {
    /// Uses the type's [`Dispose`] impl as the teardown hook.
    pub fn disposable(self) -> Self {
        self.with_teardown(T::dispose)
    }
}

impl<T> fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .field("type", &type_name::<T>())
            .finish()
    }
}

// =============================================================================
// Dependencies
// =============================================================================

/// The resolved dependencies handed to a factory, in declaration order.
#[derive(Clone, Default)]
pub struct Dependencies {
    resolved: Vec<(ServiceKey, Instance)>,
}

impl Dependencies {
    pub(crate) fn from_resolved(resolved: Vec<(ServiceKey, Instance)>) -> Self {
        Self { resolved }
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Returns the dependency registered under `key`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> ContainerResult<Arc<T>> {
        let (key, instance) = self
            .resolved
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .ok_or_else(|| ContainerError::UnknownService {
                key: ServiceKey::new(key.to_owned()),
                required_by: None,
            })?;
        downcast(key, Arc::clone(instance))
    }

    /// Returns the dependency at `index` in declaration order, downcast to `T`.
    pub fn at<T: Send + Sync + 'static>(&self, index: usize) -> Option<ContainerResult<Arc<T>>> {
        self.resolved
            .get(index)
            .map(|(key, instance)| downcast(key, Arc::clone(instance)))
    }

    /// Returns the erased instance registered under `key`.
    pub fn instance(&self, key: &str) -> Option<&Instance> {
        self.resolved
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, instance)| instance)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.resolved.iter().map(|(key, _)| key)
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}
