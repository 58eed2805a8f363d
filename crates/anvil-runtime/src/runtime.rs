//! Process bootstrap: wires the container, the event bus and the plugin
//! registry together and drives them from startup to shutdown.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use anvil_runtime::AnvilRuntime;
//!
//! // Loads anvil.toml from the current directory and installs logging.
//! let runtime = AnvilRuntime::new()?;
//! runtime.container().register_instance("Clock", SystemClock)?;
//! runtime.register_plugin(greeter_descriptor())?;
//!
//! // Starts every plugin, waits for Ctrl+C or SIGTERM, then tears down.
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anvil_core::{Container, EventBus, ServiceKey};
use anvil_framework::{PluginDescriptor, PluginRegistry, PluginState};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{AnvilConfig, ConfigLoader, ConfigResult};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Owns the shared container, bus and plugin registry of one application.
pub struct AnvilRuntime {
    config: AnvilConfig,
    container: Arc<Container>,
    bus: EventBus,
    registry: PluginRegistry,
    running: RwLock<bool>,
}

/// Snapshot of what the runtime is hosting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub plugins: usize,
    pub started: usize,
    pub failed: usize,
    pub services: usize,
    pub subscribers: usize,
    pub pending_tasks: usize,
}

impl AnvilRuntime {
    /// Key under which the loaded [`AnvilConfig`] is registered in the container.
    pub const CONFIG_KEY: ServiceKey = ServiceKey::from_static("anvil.config");

    /// Loads configuration from the default locations, installs logging and
    /// builds the runtime.
    pub fn new() -> RuntimeResult<Self> {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Builds a runtime from an already-loaded configuration.
    ///
    /// Logging is left untouched; see [`logging::init_from_config`].
    pub fn from_config(config: AnvilConfig) -> RuntimeResult<Self> {
        let container = Arc::new(Container::new());
        let bus = Self::create_bus(&config);

        container.register_instance(EventBus::KEY, bus.clone())?;
        container.register_instance(Self::CONFIG_KEY, config.clone())?;

        let registry = PluginRegistry::new(Arc::clone(&container), bus.clone())
            .with_configs(config.plugins.clone());

        info!(
            async_delivery = bus.supports_async(),
            plugin_sections = config.plugins.len(),
            disabled = ?config.disabled_plugins,
            "Runtime initialized"
        );

        Ok(Self {
            config,
            container,
            bus,
            registry,
            running: RwLock::new(false),
        })
    }

    fn create_bus(config: &AnvilConfig) -> EventBus {
        if !config.bus.async_delivery {
            debug!("Async delivery disabled, event bus is sync-only");
            return EventBus::sync_only();
        }
        match Handle::try_current() {
            Ok(handle) => EventBus::with_executor(handle),
            Err(_) => {
                warn!("No tokio runtime available, event bus is sync-only");
                EventBus::sync_only()
            }
        }
    }

    pub fn config(&self) -> &AnvilConfig {
        &self.config
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn stats(&self) -> RuntimeStats {
        let plugins = self.registry.plugins();
        RuntimeStats {
            plugins: plugins.len(),
            started: plugins
                .iter()
                .filter(|p| p.state == PluginState::Started)
                .count(),
            failed: plugins
                .iter()
                .filter(|p| p.state == PluginState::Failed)
                .count(),
            services: self.container.len(),
            subscribers: self.bus.total_subscribers(),
            pending_tasks: self.bus.pending_tasks(),
        }
    }

    // ─── Plugins ────────────────────────────────────────────────────────────

    /// Registers a plugin unless configuration disables it.
    ///
    /// Returns `false` when the plugin was skipped.
    pub fn register_plugin(&self, descriptor: PluginDescriptor) -> RuntimeResult<bool> {
        if self.config.is_disabled(descriptor.name()) {
            info!(plugin = descriptor.name(), "Plugin disabled by configuration");
            return Ok(false);
        }
        self.registry.register_descriptor(descriptor)?;
        Ok(true)
    }

    pub fn register_plugins<I>(&self, descriptors: I) -> RuntimeResult<usize>
    where
        I: IntoIterator<Item = PluginDescriptor>,
    {
        let mut registered = 0;
        for descriptor in descriptors {
            if self.register_plugin(descriptor)? {
                registered += 1;
            }
        }
        Ok(registered)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Starts every registered plugin.
    ///
    /// Individual plugin failures are logged and leave the plugin `Failed`;
    /// they do not fail the runtime.
    pub async fn start(&self) -> RuntimeResult<RuntimeStats> {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(self.stats());
            }
            *running = true;
        }

        info!(plugins = self.registry.len(), "Starting Anvil runtime");
        self.registry.start_all().await;

        for summary in self.registry.plugins() {
            if summary.state == PluginState::Failed {
                error!(
                    plugin = %summary.name,
                    error = summary.last_error.as_deref().unwrap_or("unknown"),
                    "Plugin failed to start"
                );
            }
        }

        let stats = self.stats();
        info!(started = stats.started, failed = stats.failed, "Runtime started");
        Ok(stats)
    }

    /// Stops and unloads every plugin, drains in-flight async handlers and
    /// disposes the container.
    ///
    /// Safe to call more than once; later calls find nothing left to tear down.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        *self.running.write().await = false;
        info!("Shutting down Anvil runtime");

        self.registry.stop_all().await;
        self.registry.unload_all().await;

        self.bus.wait_idle().await;
        let async_failures = self.bus.async_failure_count();
        if async_failures > 0 {
            warn!(async_failures, "Some asynchronous event handlers failed");
        }

        self.container.dispose().inspect_err(|err| {
            error!(error = %err, "Service disposal reported failures");
        })?;

        info!("Runtime stopped");
        Ok(())
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Anvil runtime is running. Press Ctrl+C to stop.");

        let signalled = wait_for_shutdown().await;
        let shutdown = self.shutdown().await;
        signalled?;
        shutdown
    }

    /// Starts, waits for `shutdown` to resolve, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.shutdown().await
    }
}

impl std::fmt::Debug for AnvilRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnvilRuntime")
            .field("registry", &self.registry)
            .field("services", &self.container.len())
            .finish_non_exhaustive()
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration and builds an [`AnvilRuntime`].
///
/// ```rust,ignore
/// let runtime = AnvilRuntime::builder()
///     .config_file("deploy/anvil.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            init_logging: true,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: AnvilConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Skips installing the global tracing subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn load_config(self) -> ConfigResult<AnvilConfig> {
        self.config_loader.load()
    }

    pub fn build(self) -> RuntimeResult<AnvilRuntime> {
        let init_logging = self.init_logging;
        let config = self.config_loader.load()?;
        if init_logging {
            logging::init_from_config(&config.logging);
        }
        AnvilRuntime::from_config(config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Tests =====
