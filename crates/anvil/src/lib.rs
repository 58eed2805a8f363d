//! # Anvil
//!
//! An embeddable application kernel: a dependency-injection container, a
//! topic-based event bus and a plugin registry that drives every plugin
//! through a well-defined lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   owns    ┌───────────┐  resolves deps  ┌────────────────────┐
//! │ AnvilRuntime │─────────▶│ Container │◀────────────────│   PluginRegistry   │
//! │ (config, log)│          └───────────┘                 │ Discovered → ...   │
//! │              │   owns    ┌───────────┐  plugin.* events│ → Started ⇄ Stopped│
//! │              │─────────▶│ EventBus  │◀────────────────│ → Unloaded         │
//! └──────────────┘          └───────────┘                 └────────────────────┘
//! ```
//!
//! - **anvil-core**: [`Container`](core::Container) and [`EventBus`](core::EventBus)
//! - **anvil-framework**: the [`Plugin`](framework::Plugin) trait, descriptors
//!   and the [`PluginRegistry`](framework::PluginRegistry)
//! - **anvil-runtime**: configuration, logging and [`AnvilRuntime`](runtime::AnvilRuntime)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use anvil::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     async fn on_start(&self, ctx: &PluginContext) -> HookResult {
//!         info!(plugin = ctx.name(), "hello");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = AnvilRuntime::new()?;
//!     runtime.register_plugin(PluginDescriptor::new("greeter", |_| Ok(Greeter)))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use anvil_core as core;
pub use anvil_framework as framework;
pub use anvil_runtime as runtime;

/// Everything an application or plugin crate usually needs.
///
/// ```rust,ignore
/// use anvil::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use anvil_runtime::{AnvilConfig, AnvilRuntime, RuntimeError, RuntimeResult};

    // Container
    pub use anvil_core::{
        BoxError, Container, ContainerError, ContainerResult, Dependencies, Dispose, Lifetime,
        Registration, ServiceKey,
    };

    // Events
    pub use anvil_core::{
        Event, EventBus, Handler, HandlerResult, Middleware, PublishResult, SubscriptionId,
    };

    // Plugins
    pub use anvil_framework::{
        HookResult, Plugin, PluginContext, PluginDescriptor, PluginError, PluginEvent,
        PluginRegistry, PluginResult, PluginState, async_trait, topics,
    };

    // Logging
    pub use anvil_runtime::prelude::*;
}
