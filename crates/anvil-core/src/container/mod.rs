//! Service container with singleton and transient lifetimes.
//!
//! # Resolution
//!
//! Resolving a key runs in two phases:
//!
//! 1. **Plan**: the declared dependency graph below the key is walked with an
//!    explicit in-progress chain. A key that reappears on the chain yields
//!    [`ContainerError::CircularDependency`] with the full path; a missing key
//!    yields [`ContainerError::UnknownService`]. No lock other than the
//!    registration table's read lock is taken, and a registration whose
//!    subgraph has been walked once is never walked again.
//! 2. **Build**: dependencies are built depth-first and handed to the factory
//!    in declaration order. Singletons use double-checked locking on a
//!    per-registration init lock, so concurrent callers observe exactly one
//!    factory invocation and independent singletons build in parallel.
//!
//! Because cycles are rejected before any init lock is taken, the build phase
//! only ever acquires init locks along an acyclic path and cannot deadlock.
//!
//! # Disposal
//!
//! [`Container::dispose`] runs teardown hooks of cached singletons in reverse
//! creation order, so a service is always torn down before the services it
//! was built from.

mod key;
mod registration;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

pub use key::ServiceKey;
pub use registration::{Dependencies, Dispose, Instance, Lifetime, Registration};

use crate::error::{BoxError, ContainerError, ContainerResult, DisposeError, PanicError};
use registration::{ErasedFactory, ErasedTeardown, downcast};

/// A registration after type erasure.
struct Entry {
    key: ServiceKey,
    lifetime: Lifetime,
    dependencies: Vec<ServiceKey>,
    factory: ErasedFactory,
    teardown: Option<ErasedTeardown>,
    type_name: &'static str,
    /// Serializes singleton construction for this key.
    init_lock: Mutex<()>,
    /// Set once the subgraph below this key is known to be acyclic and complete.
    verified: AtomicBool,
    /// The instance was supplied by the caller rather than built here.
    prebuilt: bool,
    /// Set once the teardown of a prebuilt instance has run.
    released: AtomicBool,
}

impl Entry {
    /// The teardown to run for this entry's cached instance, if any.
    ///
    /// A prebuilt instance outlives dispose and is handed out again
    /// afterwards, so its teardown is only returned once.
    fn take_teardown(&self) -> Option<ErasedTeardown> {
        let teardown = self.teardown.clone()?;
        if self.prebuilt && self.released.swap(true, Ordering::AcqRel) {
            trace!(service = %self.key, "Prebuilt instance already torn down");
            return None;
        }
        Some(teardown)
    }
}

/// Registry of service factories plus the cache of built singletons.
///
/// The container is `Send + Sync`; share it behind an [`Arc`].
#[derive(Default)]
pub struct Container {
    registrations: RwLock<HashMap<ServiceKey, Arc<Entry>>>,
    singletons: RwLock<HashMap<ServiceKey, Instance>>,
    /// Singleton keys in the order their instances were created.
    creation_order: Mutex<Vec<ServiceKey>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Adds a registration.
    ///
    /// Fails with [`ContainerError::DuplicateKey`] if the key is taken.
    /// Dependencies are not checked here; a missing or cyclic dependency is
    /// reported when something that needs it is resolved.
    pub fn add<T: Send + Sync + 'static>(&self, registration: Registration<T>) -> ContainerResult<()> {
        let Registration {
            key,
            lifetime,
            dependencies,
            factory,
            teardown,
            prebuilt,
            ..
        } = registration;

        let mut registrations = self.registrations.write();
        if registrations.contains_key(&key) {
            return Err(ContainerError::DuplicateKey(key));
        }

        debug!(
            service = %key,
            lifetime = ?lifetime,
            dependencies = dependencies.len(),
            "Registering service"
        );

        let entry = Arc::new(Entry {
            key: key.clone(),
            lifetime,
            verified: AtomicBool::new(dependencies.is_empty()),
            dependencies,
            factory,
            teardown,
            type_name: std::any::type_name::<T>(),
            init_lock: Mutex::new(()),
            prebuilt: prebuilt.is_some(),
            released: AtomicBool::new(false),
        });
        registrations.insert(key.clone(), entry);

        if let Some(instance) = prebuilt {
            self.singletons.write().insert(key.clone(), instance);
            self.creation_order.lock().push(key);
        }
        Ok(())
    }

    /// Registers a factory under `key`.
    ///
    /// `dependencies` are resolved in order and passed to the factory.
    pub fn register<T, F>(
        &self,
        key: impl Into<ServiceKey>,
        factory: F,
        lifetime: Lifetime,
        dependencies: &[ServiceKey],
    ) -> ContainerResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.add(Registration::new(key, lifetime, factory).depends_on(dependencies))
    }

    /// Registers an already-built value as a singleton.
    pub fn register_instance<T: Send + Sync + 'static>(
        &self,
        key: impl Into<ServiceKey>,
        value: T,
    ) -> ContainerResult<()> {
        self.add(Registration::instance(key, value))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.registrations.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Returns all registered keys, sorted.
    pub fn keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = self.registrations.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn lifetime_of(&self, key: &str) -> Option<Lifetime> {
        self.registrations.read().get(key).map(|entry| entry.lifetime)
    }

    // ─── Resolution ─────────────────────────────────────────────────────────

    /// Resolves `key` to an erased instance.
    pub fn resolve(&self, key: &str) -> ContainerResult<Instance> {
        let entry = self.entry(key, None)?;
        self.ensure_acyclic(&entry)?;
        self.build(&entry)
    }

    /// Resolves `key` and downcasts the instance to `T`.
    pub fn resolve_as<T: Send + Sync + 'static>(&self, key: &str) -> ContainerResult<Arc<T>> {
        let entry = self.entry(key, None)?;
        self.ensure_acyclic(&entry)?;
        let instance = self.build(&entry)?;
        downcast(&entry.key, instance)
    }

    /// Resolves every key in order, as a factory would receive them.
    pub fn resolve_all(&self, keys: &[ServiceKey]) -> ContainerResult<Dependencies> {
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            let entry = self.entry(key.as_str(), None)?;
            self.ensure_acyclic(&entry)?;
            resolved.push((entry.key.clone(), self.build(&entry)?));
        }
        Ok(Dependencies::from_resolved(resolved))
    }

    fn entry(&self, key: &str, required_by: Option<&ServiceKey>) -> ContainerResult<Arc<Entry>> {
        self.registrations
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ContainerError::UnknownService {
                key: ServiceKey::new(key.to_owned()),
                required_by: required_by.cloned(),
            })
    }

    fn ensure_acyclic(&self, entry: &Arc<Entry>) -> ContainerResult<()> {
        if entry.verified.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut chain = Vec::new();
        self.visit(entry, &mut chain)
    }

    fn visit(&self, entry: &Arc<Entry>, chain: &mut Vec<ServiceKey>) -> ContainerResult<()> {
        if entry.verified.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(start) = chain.iter().position(|key| *key == entry.key) {
            let mut path = chain[start..].to_vec();
            path.push(entry.key.clone());
            warn!(service = %entry.key, cycle = ?path, "Circular dependency detected");
            return Err(ContainerError::CircularDependency { path });
        }

        chain.push(entry.key.clone());
        for dependency in &entry.dependencies {
            let child = self.entry(dependency.as_str(), Some(&entry.key))?;
            self.visit(&child, chain)?;
        }
        chain.pop();

        entry.verified.store(true, Ordering::Release);
        Ok(())
    }

    fn build(&self, entry: &Arc<Entry>) -> ContainerResult<Instance> {
        match entry.lifetime {
            Lifetime::Transient => self.construct(entry),
            Lifetime::Singleton => {
                if let Some(instance) = self.cached(&entry.key) {
                    return Ok(instance);
                }

                let _init = entry.init_lock.lock();
                if let Some(instance) = self.cached(&entry.key) {
                    return Ok(instance);
                }

                let instance = self.construct(entry)?;
                self.singletons
                    .write()
                    .insert(entry.key.clone(), Arc::clone(&instance));
                self.creation_order.lock().push(entry.key.clone());
                debug!(service = %entry.key, service_type = entry.type_name, "Singleton created");
                Ok(instance)
            }
        }
    }

    fn cached(&self, key: &ServiceKey) -> Option<Instance> {
        self.singletons.read().get(key).cloned()
    }

    fn construct(&self, entry: &Arc<Entry>) -> ContainerResult<Instance> {
        let mut resolved = Vec::with_capacity(entry.dependencies.len());
        for dependency in &entry.dependencies {
            let child = self.entry(dependency.as_str(), Some(&entry.key))?;
            let instance = self.build(&child)?;
            resolved.push((child.key.clone(), instance));
        }

        trace!(service = %entry.key, "Invoking factory");
        (entry.factory)(&Dependencies::from_resolved(resolved)).map_err(|source| {
            ContainerError::FactoryFailed {
                key: entry.key.clone(),
                source,
            }
        })
    }

    // ─── Disposal ───────────────────────────────────────────────────────────

    /// Runs teardown hooks of cached singletons in reverse creation order and
    /// clears the cache.
    ///
    /// Every hook runs even if earlier ones fail or panic; failures are
    /// collected into the returned [`DisposeError`]. Transients are never
    /// torn down. Registrations are kept, so later resolutions rebuild
    /// factory singletons. Instances added with [`Registration::instance`]
    /// resolve to the same value again but are torn down at most once.
    pub fn dispose(&self) -> Result<(), DisposeError> {
        let order = std::mem::take(&mut *self.creation_order.lock());
        let mut cache = std::mem::take(&mut *self.singletons.write());

        let teardowns: HashMap<ServiceKey, ErasedTeardown> = {
            let registrations = self.registrations.read();
            order
                .iter()
                .filter_map(|key| {
                    let teardown = registrations.get(key)?.take_teardown()?;
                    Some((key.clone(), teardown))
                })
                .collect()
        };

        let mut failures = Vec::new();
        for key in order.iter().rev() {
            let Some(instance) = cache.remove(key) else {
                continue;
            };
            let Some(teardown) = teardowns.get(key) else {
                continue;
            };

            trace!(service = %key, "Running teardown");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| teardown(&instance)))
                .unwrap_or_else(|payload| Err(PanicError::from_payload(payload).into()));
            if let Err(error) = outcome {
                warn!(service = %key, error = %error, "Teardown failed");
                failures.push((key.clone(), error));
            }
        }

        info!(
            disposed = order.len(),
            failed = failures.len(),
            "Container disposed"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DisposeError { failures })
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.len())
            .field("singletons", &self.singletons.read().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex as StdMutex};
    use std::thread;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    struct Logger {
        prefix: &'static str,
    }

    struct Service {
        logger: Arc<Logger>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Failure(&'static str);

    #[test]
    fn test_singleton_injected_into_transient() {
        let container = Container::new();
        container
            .register("Logger", |_| Ok(Logger { prefix: "app" }), Lifetime::Singleton, &[])
            .unwrap();
        container
            .register(
                "Service",
                |deps| {
                    Ok(Service {
                        logger: deps.get::<Logger>("Logger")?,
                    })
                },
                Lifetime::Transient,
                &["Logger".into()],
            )
            .unwrap();

        let first = container.resolve_as::<Service>("Service").unwrap();
        let second = container.resolve_as::<Service>("Service").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.logger, &second.logger));
        assert_eq!(first.logger.prefix, "app");
    }

    #[test]
    fn test_transient_factory_runs_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let container = Container::new();
        container
            .add(Registration::transient("Counter", move |_| {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            }))
            .unwrap();

        let a = container.resolve_as::<usize>("Counter").unwrap();
        let b = container.resolve_as::<usize>("Counter").unwrap();

        assert_eq!((*a, *b), (0, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_duplicate_key() {
        let container = Container::new();
        container.register_instance("Port", 8080u16).unwrap();
        let err = container.register_instance("Port", 9090u16).unwrap_err();

        assert!(matches!(err, ContainerError::DuplicateKey(ref key) if key.as_str() == "Port"));
        assert_eq!(*container.resolve_as::<u16>("Port").unwrap(), 8080);
    }

    #[test]
    fn test_circular_dependency_reports_path() {
        let container = Container::new();
        container
            .add(Registration::singleton("A", |_| Ok(())).depends_on(["B"]))
            .unwrap();
        container
            .add(Registration::singleton("B", |_| Ok(())).depends_on(["A"]))
            .unwrap();

        match container.resolve("A") {
            Err(ContainerError::CircularDependency { path }) => {
                let path: Vec<_> = path.iter().map(ServiceKey::as_str).collect();
                assert_eq!(path, ["A", "B", "A"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let container = Container::new();
        container
            .add(Registration::transient("Loop", |_| Ok(())).depends_on(["Loop"]))
            .unwrap();

        let err = container.resolve("Loop").unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency { ref path } if path.len() == 2));
    }

    #[test]
    fn test_missing_dependency_names_parent() {
        let container = Container::new();
        container
            .add(Registration::singleton("B", |_| Ok(())).depends_on(["X"]))
            .unwrap();

        match container.resolve("B") {
            Err(ContainerError::UnknownService { key, required_by }) => {
                assert_eq!(key.as_str(), "X");
                assert_eq!(required_by.as_ref().map(ServiceKey::as_str), Some("B"));
            }
            other => panic!("expected unknown service, got {other:?}"),
        }
        assert!(matches!(
            container.resolve("Nope"),
            Err(ContainerError::UnknownService { required_by: None, .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.register_instance("Name", String::from("anvil")).unwrap();

        let err = assert_err!(container.resolve_as::<u32>("Name"));
        assert!(matches!(err, ContainerError::TypeMismatch { expected: "u32", .. }));
    }

    #[test]
    fn test_factory_failure_is_wrapped() {
        let container = Container::new();
        container
            .add(Registration::<()>::singleton("Db", |_| Err(Failure("refused").into())))
            .unwrap();

        let err = assert_err!(container.resolve("Db"));
        assert!(matches!(err, ContainerError::FactoryFailed { ref key, .. } if key.as_str() == "Db"));
        assert_eq!(err.to_string(), "factory for service 'Db' failed: refused");
        // A failed factory caches nothing.
        assert_err!(container.resolve("Db"));
    }

    #[test]
    fn test_concurrent_singleton_resolution_creates_once() {
        const THREADS: usize = 8;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let container = Container::new();
        container
            .add(Registration::singleton("Slow", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(20));
                Ok(String::from("ready"))
            }))
            .unwrap();

        let barrier = Barrier::new(THREADS);
        let instances: Vec<Arc<String>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        container.resolve_as::<String>("Slow").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_dispose_runs_in_reverse_creation_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let container = Container::new();

        for (key, deps) in [("Config", vec![]), ("Pool", vec!["Config"]), ("Cache", vec!["Pool"])] {
            let log = Arc::clone(&log);
            container
                .add(
                    Registration::singleton(key, |_| Ok(()))
                        .depends_on(deps)
                        .with_teardown(move |_| {
                            log.lock().unwrap().push(key);
                            Ok(())
                        }),
                )
                .unwrap();
        }

        assert_ok!(container.resolve("Cache"));
        assert_ok!(container.dispose());

        assert_eq!(*log.lock().unwrap(), ["Cache", "Pool", "Config"]);
    }

    #[test]
    fn test_dispose_collects_failures_and_keeps_going() {
        struct Handle {
            closed: Arc<AtomicBool>,
        }

        impl Dispose for Handle {
            fn dispose(&self) -> Result<(), BoxError> {
                self.closed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }

        let closed = Arc::new(AtomicBool::new(false));
        let container = Container::new();
        container
            .add(Registration::instance("Handle", Handle { closed: Arc::clone(&closed) }).disposable())
            .unwrap();
        container
            .add(
                Registration::singleton("Broken", |_| Ok(()))
                    .with_teardown(|_| Err(Failure("flush failed").into())),
            )
            .unwrap();
        container
            .add(Registration::singleton("Panicky", |_| Ok(())).with_teardown(|_| panic!("oops")))
            .unwrap();

        container.resolve("Broken").unwrap();
        container.resolve("Panicky").unwrap();

        let err = assert_err!(container.dispose());
        let keys: Vec<_> = err.keys().map(ServiceKey::as_str).collect();
        assert_eq!(keys, ["Panicky", "Broken"]);
        assert!(closed.load(Ordering::SeqCst));

        // Cache is empty afterwards; a second dispose has nothing to do.
        assert_ok!(container.dispose());
    }

    #[test]
    fn test_prebuilt_instance_torn_down_once() {
        struct Socket {
            closes: Arc<AtomicUsize>,
        }

        impl Dispose for Socket {
            fn dispose(&self) -> Result<(), BoxError> {
                self.closes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let closes = Arc::new(AtomicUsize::new(0));
        let socket = Socket {
            closes: Arc::clone(&closes),
        };
        let container = Container::new();
        assert_ok!(container.add(Registration::instance("Socket", socket).disposable()));
        let before = assert_ok!(container.resolve_as::<Socket>("Socket"));

        assert_ok!(container.dispose());
        let after = assert_ok!(container.resolve_as::<Socket>("Socket"));
        assert_ok!(container.dispose());

        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_singleton_rebuilt_and_torn_down_after_dispose() {
        let built = Arc::new(AtomicUsize::new(0));
        let torn_down = Arc::new(AtomicUsize::new(0));
        let (factory_calls, teardown_calls) = (Arc::clone(&built), Arc::clone(&torn_down));
        let container = Container::new();
        container
            .add(
                Registration::singleton("Pool", move |_| {
                    Ok(factory_calls.fetch_add(1, Ordering::SeqCst))
                })
                .with_teardown(move |_| {
                    teardown_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        for _ in 0..2 {
            assert_ok!(container.resolve("Pool"));
            assert_ok!(container.dispose());
        }

        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(torn_down.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transients_are_not_disposed() {
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&torn_down);
        let container = Container::new();
        container
            .add(Registration::transient("Temp", |_| Ok(())).with_teardown(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();

        assert_ok!(container.resolve("Temp"));
        assert_ok!(container.dispose());
        assert_eq!(torn_down.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolve_all_keeps_declaration_order() {
        let container = Container::new();
        container.register_instance("first", 1u8).unwrap();
        container.register_instance("second", 2u8).unwrap();

        let deps = container
            .resolve_all(&["second".into(), "first".into()])
            .unwrap();
        let keys: Vec<_> = deps.keys().map(ServiceKey::as_str).collect();
        assert_eq!(keys, ["second", "first"]);
        assert_eq!(*deps.at::<u8>(0).unwrap().unwrap(), 2);
        assert!(deps.at::<u8>(5).is_none());
    }
}
