//! Greeter Demo
//!
//! Wires two host services and three plugins together:
//!
//! ```text
//! Counter (singleton) ◀── greeter ── publishes "greeting.sent"
//!                                        │
//!                         audit ◀────────┤ (sync handler)
//!                         courier ◀──────┘ (async handler)
//! ```
//!
//! `anvil.toml` next to this file configures the greeter and disables the
//! `shouter` plugin.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package greeter
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anvil::prelude::*;
use anyhow::Result;
use serde::Deserialize;

const GREETING_SENT: &str = "greeting.sent";

// ============================================================================
// Services
// ============================================================================

/// Counts greetings across every plugin.
#[derive(Default)]
struct Counter {
    sent: AtomicU64,
}

impl Counter {
    fn bump(&self) -> u64 {
        self.sent.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Dispose for Counter {
    fn dispose(&self) -> Result<(), BoxError> {
        info!(total = self.sent.load(Ordering::Relaxed), "Counter disposed");
        Ok(())
    }
}

/// Formats greetings. Transient, so every plugin gets its own.
struct Formatter {
    punctuation: char,
}

impl Formatter {
    fn format(&self, greeting: &str, target: &str) -> String {
        format!("{greeting}, {target}{}", self.punctuation)
    }
}

#[derive(Debug, Clone)]
struct Greeting {
    text: String,
    sequence: u64,
}

// ============================================================================
// Plugins
// ============================================================================

#[derive(Debug, Deserialize)]
struct GreeterConfig {
    greeting: String,
    #[serde(default)]
    targets: Vec<String>,
}

struct GreeterPlugin {
    counter: Arc<Counter>,
    formatter: Arc<Formatter>,
}

#[async_trait]
impl Plugin for GreeterPlugin {
    async fn on_init(&self, ctx: &PluginContext) -> HookResult {
        let config: GreeterConfig = ctx.config()?;
        info!(plugin = ctx.name(), targets = config.targets.len(), "Greeter configured");
        ctx.set_state(Arc::new(config));
        Ok(())
    }

    async fn on_start(&self, ctx: &PluginContext) -> HookResult {
        let config = ctx
            .get_state::<Arc<GreeterConfig>>()
            .ok_or("greeter started without configuration")?;

        for target in &config.targets {
            let greeting = Greeting {
                text: self.formatter.format(&config.greeting, target),
                sequence: self.counter.bump(),
            };
            let result = ctx.bus().publish(GREETING_SENT, greeting);
            debug!(delivered = result.delivered(), "Greeting published");
        }
        Ok(())
    }
}

/// Keeps a log of every greeting.
struct AuditPlugin;

#[async_trait]
impl Plugin for AuditPlugin {
    async fn on_init(&self, ctx: &PluginContext) -> HookResult {
        let id = ctx.bus().subscribe_sync(GREETING_SENT, |event: &Event| {
            if let Some(greeting) = event.payload::<Greeting>() {
                info!(sequence = greeting.sequence, text = %greeting.text, "Audited greeting");
            }
            Ok(())
        })?;
        ctx.set_state(id);
        Ok(())
    }

    async fn on_unload(&self, ctx: &PluginContext) -> HookResult {
        if let Some(id) = ctx.take_state::<SubscriptionId>() {
            ctx.bus().unsubscribe(id);
        }
        Ok(())
    }
}

/// Delivers greetings asynchronously.
struct CourierPlugin;

#[async_trait]
impl Plugin for CourierPlugin {
    async fn on_init(&self, ctx: &PluginContext) -> HookResult {
        let id = ctx
            .bus()
            .subscribe_async(GREETING_SENT, |event: Event| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if let Some(greeting) = event.payload::<Greeting>() {
                    info!(text = %greeting.text, "Greeting delivered");
                }
                Ok(())
            })?;
        ctx.set_state(id);
        Ok(())
    }

    async fn on_unload(&self, ctx: &PluginContext) -> HookResult {
        if let Some(id) = ctx.take_state::<SubscriptionId>() {
            ctx.bus().unsubscribe(id);
        }
        Ok(())
    }
}

/// Disabled in `anvil.toml`; never registered.
struct ShouterPlugin;

#[async_trait]
impl Plugin for ShouterPlugin {}

// ============================================================================
// Wiring
// ============================================================================

fn register_services(container: &Container) -> ContainerResult<()> {
    container.add(
        Registration::singleton("Counter", |_: &Dependencies| Ok(Counter::default())).disposable(),
    )?;
    container.add(Registration::transient("Formatter", |_: &Dependencies| {
        Ok(Formatter { punctuation: '!' })
    }))?;
    Ok(())
}

/// Listeners carry a lower priority than the greeter so their
/// subscriptions exist before the first greeting is published.
fn plugins() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::new("audit", |_| Ok(AuditPlugin))
            .priority(10)
            .version("1.0.0")
            .describe("Logs greetings as they are sent"),
        PluginDescriptor::new("courier", |_| Ok(CourierPlugin))
            .priority(10)
            .version("0.3.0")
            .describe("Delivers greetings in the background"),
        PluginDescriptor::new("greeter", |deps| {
            Ok(GreeterPlugin {
                counter: deps.get("Counter")?,
                formatter: deps.get("Formatter")?,
            })
        })
        .depends_on(["Counter", "Formatter"])
        .priority(20)
        .version("1.0.0")
        .describe("Greets every configured target"),
        PluginDescriptor::new("shouter", |_| Ok(ShouterPlugin)),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = AnvilRuntime::builder()
        .search_path(env!("CARGO_MANIFEST_DIR"))
        .build()?;

    register_services(runtime.container())?;

    runtime.bus().subscribe_sync(topics::PLUGIN_FAILED, |event: &Event| {
        if let Some(failure) = event.payload::<PluginEvent>() {
            error!(plugin = %failure.name, error = ?failure.error, "Plugin failed");
        }
        Ok(())
    })?;

    let registered = runtime.register_plugins(plugins())?;
    info!(registered, "Plugins registered");

    runtime.run().await?;
    Ok(())
}
