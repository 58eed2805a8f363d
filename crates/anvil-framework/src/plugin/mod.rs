//! The plugin contract.
//!
//! A plugin is any type implementing [`Plugin`]. Every hook has a no-op
//! default, so a plugin only overrides the stages it cares about:
//!
//! ```rust,ignore
//! struct Heartbeat;
//!
//! #[async_trait]
//! impl Plugin for Heartbeat {
//!     async fn on_start(&self, ctx: &PluginContext) -> HookResult {
//!         ctx.bus().publish("heartbeat.online", ());
//!         Ok(())
//!     }
//! }
//!
//! let descriptor = PluginDescriptor::new("heartbeat", |_deps| Ok(Heartbeat))
//!     .version("1.0.0")
//!     .describe("Announces itself when started");
//! registry.register_descriptor(descriptor)?;
//! ```
//!
//! The registry never calls two hooks of the same plugin concurrently, but
//! hooks of different plugins may run at the same time. A hook returning an
//! error (or panicking) moves its plugin to `Failed`.

mod descriptor;

use async_trait::async_trait;

pub use descriptor::{ANVIL_PLUGIN_API_VERSION, DEFAULT_PRIORITY, PluginDescriptor, PluginFactory, PluginMetadata};

use crate::context::PluginContext;
use crate::error::HookResult;

/// Lifecycle hooks of a plugin instance.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Runs on `Loaded -> Initialized`.
    async fn on_init(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// Runs on `Initialized -> Started` and `Stopped -> Started`.
    async fn on_start(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// Runs on `Started -> Stopped`.
    async fn on_stop(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// Runs on `Stopped -> Unloaded`, after which the instance is dropped.
    async fn on_unload(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }
}
