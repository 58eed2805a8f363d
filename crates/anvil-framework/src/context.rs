//! The context handed to every plugin hook.
//!
//! A [`PluginContext`] is built once, when the plugin is loaded, and lives as
//! long as the plugin instance. It carries:
//!
//! - the plugin's resolved dependencies, in declaration order;
//! - the plugin's configuration section (or `null` when absent);
//! - handles to the shared [`EventBus`] and [`Container`];
//! - a per-plugin state map, isolated from every other plugin.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use anvil_core::{Container, ContainerResult, Dependencies, EventBus};
use parking_lot::Mutex;
use serde_json::Value;

pub struct PluginContext {
    name: Arc<str>,
    dependencies: Dependencies,
    config: Arc<Value>,
    bus: EventBus,
    container: Arc<Container>,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl PluginContext {
    pub(crate) fn new(
        name: Arc<str>,
        dependencies: Dependencies,
        config: Arc<Value>,
        bus: EventBus,
        container: Arc<Container>,
    ) -> Self {
        Self {
            name,
            dependencies,
            config,
            bus,
            container,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dependencies resolved for this plugin at load time.
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Shorthand for `dependencies().get::<T>(key)`.
    pub fn dependency<T: Send + Sync + 'static>(&self, key: &str) -> ContainerResult<Arc<T>> {
        self.dependencies.get(key)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// The raw configuration section.
    pub fn raw_config(&self) -> &Value {
        &self.config
    }

    /// Deserializes the configuration section into `T`.
    ///
    /// A missing section is `null`; use `Option<T>` or a struct with
    /// `#[serde(default)]` to accept it.
    pub fn config<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.config.as_ref())
    }

    // ─── Plugin-local state ─────────────────────────────────────────────────

    /// Stores `value`, replacing any previous value of the same type.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored `T`.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn has_state<T: 'static>(&self) -> bool {
        self.state.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored `T`.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct GreeterConfig {
        greeting: String,
        #[serde(default)]
        repeat: u32,
    }

    fn context(config: Value) -> PluginContext {
        PluginContext::new(
            Arc::from("greeter"),
            Dependencies::default(),
            Arc::new(config),
            EventBus::sync_only(),
            Arc::new(Container::new()),
        )
    }

    #[test]
    fn test_typed_config() {
        let ctx = context(json!({ "greeting": "hi" }));
        let cfg: GreeterConfig = ctx.config().unwrap();
        assert_eq!(
            cfg,
            GreeterConfig {
                greeting: "hi".into(),
                repeat: 0
            }
        );
    }

    #[test]
    fn test_missing_config_is_null() {
        let ctx = context(Value::Null);
        assert_eq!(ctx.config::<Option<GreeterConfig>>().unwrap(), None);
        assert!(ctx.config::<GreeterConfig>().is_err());
    }

    #[test]
    fn test_state_is_typed() {
        let ctx = context(Value::Null);
        assert!(!ctx.has_state::<u32>());

        ctx.set_state(3u32);
        ctx.set_state(String::from("x"));
        assert_eq!(ctx.get_state::<u32>(), Some(3));
        assert_eq!(ctx.take_state::<String>().as_deref(), Some("x"));
        assert!(!ctx.has_state::<String>());
        assert!(ctx.has_state::<u32>());
    }
}
