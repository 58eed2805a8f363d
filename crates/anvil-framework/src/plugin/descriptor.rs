//! Plugin descriptors: what the registry knows about a plugin before it exists.

use std::fmt;
use std::sync::Arc;

use anvil_core::{BoxError, Dependencies, ServiceKey};
use serde::Serialize;

use super::Plugin;

/// Current plugin API version (1.0).
///
/// The upper 16 bits are the major version, the lower 16 the minor.
pub const ANVIL_PLUGIN_API_VERSION: u32 = 0x0001_0000;

/// Priority given to descriptors that do not set one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Builds a plugin instance from its resolved dependencies.
pub type PluginFactory =
    Arc<dyn Fn(&Dependencies) -> Result<Box<dyn Plugin>, BoxError> + Send + Sync>;

/// Descriptive metadata, surfaced in logs and registry listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    pub version: String,
    pub description: String,
}

/// Name, dependencies and factory of one plugin.
///
/// Cloning is cheap; the factory is shared.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: Arc<str>,
    dependencies: Vec<ServiceKey>,
    provides: Vec<ServiceKey>,
    metadata: PluginMetadata,
    api_version: u32,
    priority: i32,
    factory: PluginFactory,
}

impl PluginDescriptor {
    /// Creates a descriptor whose factory builds a `P`.
    pub fn new<P, F>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        P: Plugin,
        F: Fn(&Dependencies) -> Result<P, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            provides: Vec::new(),
            metadata: PluginMetadata::default(),
            api_version: ANVIL_PLUGIN_API_VERSION,
            priority: DEFAULT_PRIORITY,
            factory: Arc::new(move |deps: &Dependencies| {
                factory(deps).map(|plugin| Box::new(plugin) as Box<dyn Plugin>)
            }),
        }
    }

    /// Container keys resolved and injected when the plugin loads.
    pub fn depends_on<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ServiceKey>,
    {
        self.dependencies.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Container keys this plugin registers for others.
    ///
    /// Only used to order `start_all`: a plugin depending on a key provided
    /// by another plugin starts after it.
    pub fn provides<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ServiceKey>,
    {
        self.provides.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = version.into();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Overrides the API version this descriptor claims to target.
    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Startup priority within a dependency layer. Lower runs first.
    ///
    /// Plugins of equal priority in one layer start concurrently; stopping
    /// and unloading walk the groups in reverse.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn dependencies(&self) -> &[ServiceKey] {
        &self.dependencies
    }

    pub fn provided(&self) -> &[ServiceKey] {
        &self.provides
    }

    pub fn startup_priority(&self) -> i32 {
        self.priority
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Whether this descriptor can be hosted by this build.
    ///
    /// The major part must match exactly; the descriptor's minor part must
    /// not exceed the host's.
    pub fn is_compatible(&self) -> bool {
        let (major, minor) = (self.api_version >> 16, self.api_version & 0xFFFF);
        major == ANVIL_PLUGIN_API_VERSION >> 16 && minor <= ANVIL_PLUGIN_API_VERSION & 0xFFFF
    }

    pub(crate) fn raw_api_version(&self) -> u32 {
        self.api_version
    }

    pub(crate) fn instantiate(&self, deps: &Dependencies) -> Result<Box<dyn Plugin>, BoxError> {
        (self.factory)(deps)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("provides", &self.provides)
            .field("metadata", &self.metadata)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Plugin for Noop {}

    #[test]
    fn test_builder() {
        let descriptor = PluginDescriptor::new("noop", |_| Ok(Noop))
            .depends_on(["Logger", "Clock"])
            .provides(["Noop"])
            .version("1.2.0")
            .describe("does nothing");

        assert_eq!(descriptor.name(), "noop");
        let deps: Vec<_> = descriptor.dependencies().iter().map(ServiceKey::as_str).collect();
        assert_eq!(deps, ["Logger", "Clock"]);
        assert_eq!(descriptor.provided()[0].as_str(), "Noop");
        assert_eq!(descriptor.metadata().version, "1.2.0");
        assert_eq!(descriptor.startup_priority(), DEFAULT_PRIORITY);
        assert_eq!(descriptor.priority(10).startup_priority(), 10);
    }

    #[test]
    fn test_instantiate() {
        let descriptor = PluginDescriptor::new("noop", |_| Ok(Noop));
        assert!(descriptor.instantiate(&Dependencies::default()).is_ok());
    }

    #[test]
    fn test_api_compatibility() {
        let current = PluginDescriptor::new("a", |_| Ok(Noop));
        assert!(current.is_compatible());

        let older_minor = PluginDescriptor::new("b", |_| Ok(Noop)).api_version(0x0001_0000);
        assert!(older_minor.is_compatible());

        let newer_minor = PluginDescriptor::new("c", |_| Ok(Noop)).api_version(0x0001_0001);
        assert!(!newer_minor.is_compatible());

        let other_major = PluginDescriptor::new("d", |_| Ok(Noop)).api_version(0x0002_0000);
        assert!(!other_major.is_compatible());
    }
}
