//! # Anvil Framework
//!
//! Plugins and their lifecycle, built on the container and bus of
//! `anvil-core`.
//!
//! This layer provides:
//! - The [`Plugin`] trait with async `on_init` / `on_start` / `on_stop` /
//!   `on_unload` hooks
//! - [`PluginDescriptor`]: name, container dependencies and factory of a plugin
//! - [`PluginRegistry`]: the lifecycle state machine, single-plugin and bulk
//!   operations, and `plugin.*` lifecycle events
//!
//! ```text
//! Discovered → Loaded → Initialized → Started ⇄ Stopped → Unloaded
//!                  (any failing step) → Failed
//! ```

pub mod context;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod state;
pub mod topics;

pub use context::PluginContext;
pub use error::{HookResult, PluginError, PluginLifecycleError, PluginResult};
pub use plugin::{ANVIL_PLUGIN_API_VERSION, DEFAULT_PRIORITY, Plugin, PluginDescriptor, PluginFactory, PluginMetadata};
pub use registry::{PluginRegistry, PluginSummary};
pub use state::{PluginState, Stage};
pub use topics::PluginEvent;

/// Re-exported so plugin crates need no direct dependency.
pub use async_trait::async_trait;
