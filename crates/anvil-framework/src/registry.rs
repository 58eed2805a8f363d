//! Plugin registry and lifecycle driver.
//!
//! [`PluginRegistry`] owns one record per registered plugin and moves it
//! through the lifecycle in [`crate::state`]. Every successful step publishes
//! the matching `plugin.*` topic on the bus; every failed step moves the
//! plugin to `Failed`, stores the error on its record, publishes
//! `plugin.failed` and returns the error.
//!
//! # Concurrency
//!
//! Each record has its own async lifecycle lock, held for the whole step
//! (transition check, hook, state change, event). Operations on one plugin
//! are therefore serialized while different plugins proceed independently.
//! State queries never wait on that lock.
//!
//! # Bulk operations
//!
//! [`PluginRegistry::start_all`] orders plugins into dependency layers: a
//! plugin that depends on a key another plugin [`provides`] lands in a later
//! layer than its provider. Plugins inside one layer are brought up
//! concurrently; layers run one after another. Dependencies on keys no
//! plugin provides are assumed to be host services and do not affect order.
//! [`PluginRegistry::stop_all`] and [`PluginRegistry::unload_all`] walk the
//! layers in reverse. A failing plugin never stops a bulk operation.
//!
//! Inside a layer, plugins are further grouped by [`priority`], lowest
//! first. Groups run one after another; plugins sharing a priority run
//! concurrently.
//!
//! [`provides`]: crate::PluginDescriptor::provides
//! [`priority`]: crate::PluginDescriptor::priority

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anvil_core::{BoxError, Container, EventBus, PanicError};
use futures::FutureExt;
use futures::future;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::context::PluginContext;
use crate::error::{HookResult, PluginError, PluginLifecycleError, PluginResult};
use crate::plugin::{ANVIL_PLUGIN_API_VERSION, Plugin, PluginDescriptor, PluginMetadata};
use crate::state::{PluginState, Stage};
use crate::topics::{self, PluginEvent};

// ─── Records ──────────────────────────────────────────────────────────────────

struct LiveInstance {
    plugin: Box<dyn Plugin>,
    ctx: PluginContext,
}

struct SlotStatus {
    state: PluginState,
    last_error: Option<Arc<PluginLifecycleError>>,
}

struct PluginSlot {
    descriptor: PluginDescriptor,
    status: Mutex<SlotStatus>,
    /// Lifecycle lock; holds the instance from load until unload or failure.
    live: tokio::sync::Mutex<Option<LiveInstance>>,
}

impl PluginSlot {
    fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            status: Mutex::new(SlotStatus {
                state: PluginState::Discovered,
                last_error: None,
            }),
            live: tokio::sync::Mutex::new(None),
        }
    }

    fn name(&self) -> &str {
        self.descriptor.name()
    }

    fn state(&self) -> PluginState {
        self.status.lock().state
    }
}

/// Point-in-time view of one plugin, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub state: PluginState,
    pub metadata: PluginMetadata,
    pub priority: i32,
    pub dependencies: Vec<String>,
    pub last_error: Option<String>,
}

// ─── Registry ─────────────────────────────────────────────────────────────────

pub struct PluginRegistry {
    container: Arc<Container>,
    bus: EventBus,
    /// Configuration sections keyed by plugin name.
    configs: RwLock<HashMap<String, Arc<Value>>>,
    /// Records in registration order.
    slots: RwLock<Vec<Arc<PluginSlot>>>,
}

impl PluginRegistry {
    pub fn new(container: Arc<Container>, bus: EventBus) -> Self {
        Self {
            container,
            bus,
            configs: RwLock::new(HashMap::new()),
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Sets the configuration sections handed to plugins at load time.
    pub fn with_configs(self, configs: HashMap<String, Value>) -> Self {
        *self.configs.write() = configs
            .into_iter()
            .map(|(name, value)| (name, Arc::new(value)))
            .collect();
        self
    }

    /// Replaces one plugin's configuration section. Takes effect on its next load.
    pub fn set_config(&self, name: impl Into<String>, config: Value) {
        self.configs.write().insert(name.into(), Arc::new(config));
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Adds a plugin in the `Discovered` state.
    ///
    /// A name may be reused once its previous plugin is `Unloaded`; the old
    /// record is replaced and the plugin moves to the end of the order.
    pub fn register_descriptor(&self, descriptor: PluginDescriptor) -> PluginResult<()> {
        if !descriptor.is_compatible() {
            return Err(PluginError::Incompatible {
                name: descriptor.name().to_owned(),
                found: descriptor.raw_api_version(),
                supported: ANVIL_PLUGIN_API_VERSION,
            });
        }

        let mut slots = self.slots.write();
        if let Some(index) = slots.iter().position(|s| s.name() == descriptor.name()) {
            if slots[index].state() != PluginState::Unloaded {
                return Err(PluginError::DuplicateName(descriptor.name().to_owned()));
            }
            debug!(plugin = descriptor.name(), "Replacing unloaded plugin");
            slots.remove(index);
        }

        info!(
            plugin = descriptor.name(),
            version = %descriptor.metadata().version,
            dependencies = ?descriptor.dependencies(),
            "Plugin registered"
        );
        slots.push(Arc::new(PluginSlot::new(descriptor)));
        Ok(())
    }

    /// Removes a plugin that is `Discovered`, `Failed` or `Unloaded`.
    pub async fn remove(&self, name: &str) -> PluginResult<PluginDescriptor> {
        let slot = self.slot(name)?;
        let _live = slot.live.lock().await;

        let state = slot.state();
        if !matches!(
            state,
            PluginState::Discovered | PluginState::Failed | PluginState::Unloaded
        ) {
            return Err(PluginError::Busy {
                name: name.to_owned(),
                state,
            });
        }

        self.slots.write().retain(|s| !Arc::ptr_eq(s, &slot));
        info!(plugin = name, "Plugin removed");
        Ok(slot.descriptor.clone())
    }

    // ─── Single-plugin lifecycle ────────────────────────────────────────────

    /// `Discovered -> Loaded`: resolves dependencies and builds the instance.
    pub async fn load(&self, name: &str) -> PluginResult<()> {
        self.transition(name, Stage::Load).await
    }

    /// `Loaded -> Initialized`: runs `on_init`.
    pub async fn init(&self, name: &str) -> PluginResult<()> {
        self.transition(name, Stage::Init).await
    }

    /// `Initialized | Stopped -> Started`: runs `on_start`.
    pub async fn start(&self, name: &str) -> PluginResult<()> {
        self.transition(name, Stage::Start).await
    }

    /// `Started -> Stopped`: runs `on_stop`.
    pub async fn stop(&self, name: &str) -> PluginResult<()> {
        self.transition(name, Stage::Stop).await
    }

    /// `Stopped -> Unloaded`: runs `on_unload` and drops the instance.
    pub async fn unload(&self, name: &str) -> PluginResult<()> {
        self.transition(name, Stage::Unload).await
    }

    async fn transition(&self, name: &str, stage: Stage) -> PluginResult<()> {
        let slot = self.slot(name)?;
        self.step(&slot, stage).await
    }

    async fn step(&self, slot: &PluginSlot, stage: Stage) -> PluginResult<()> {
        let name = slot.name();
        let mut live = slot.live.lock().await;

        let from = slot.state();
        let to = stage.target();
        if !from.can_transition_to(to) {
            debug!(plugin = name, from = %from, to = %to, "Illegal lifecycle transition");
            return Err(PluginError::InvalidTransition {
                name: name.to_owned(),
                from,
                to,
            });
        }

        let outcome = if stage == Stage::Load {
            self.instantiate(slot).map(|instance| *live = Some(instance))
        } else if let Some(instance) = live.as_ref() {
            run_hook(instance, stage).await
        } else {
            Err(format!("no live instance in state {from}").into())
        };

        match outcome {
            Ok(()) => {
                if stage == Stage::Unload {
                    *live = None;
                }
                slot.status.lock().state = to;
                info!(plugin = name, state = %to, "Plugin lifecycle step completed");
                self.announce(stage.topic(), name, stage, None);
                Ok(())
            }
            Err(source) => {
                *live = None;
                Err(self.fail(slot, stage, source))
            }
        }
    }

    fn instantiate(&self, slot: &PluginSlot) -> Result<LiveInstance, BoxError> {
        let descriptor = &slot.descriptor;
        let build = || -> Result<LiveInstance, BoxError> {
            let dependencies = self.container.resolve_all(descriptor.dependencies())?;
            let plugin = descriptor.instantiate(&dependencies)?;
            let ctx = PluginContext::new(
                descriptor.shared_name(),
                dependencies,
                self.config_for(descriptor.name()),
                self.bus.clone(),
                Arc::clone(&self.container),
            );
            Ok(LiveInstance { plugin, ctx })
        };

        panic::catch_unwind(AssertUnwindSafe(build))
            .unwrap_or_else(|payload| Err(PanicError::from_payload(payload).into()))
    }

    fn config_for(&self, name: &str) -> Arc<Value> {
        self.configs
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(Value::Null))
    }

    fn fail(&self, slot: &PluginSlot, stage: Stage, source: BoxError) -> PluginError {
        let name = slot.name();
        let failure = Arc::new(PluginLifecycleError {
            name: name.to_owned(),
            stage,
            source,
        });

        {
            let mut status = slot.status.lock();
            status.state = PluginState::Failed;
            status.last_error = Some(Arc::clone(&failure));
        }

        error!(plugin = name, stage = %stage, error = %failure.source, "Plugin failed");
        self.announce(
            topics::PLUGIN_FAILED,
            name,
            stage,
            Some(failure.source.to_string()),
        );
        PluginError::Lifecycle(failure)
    }

    fn announce(&self, topic: &str, name: &str, stage: Stage, error: Option<String>) {
        let result = self.bus.publish(
            topic,
            PluginEvent {
                name: name.to_owned(),
                stage,
                error,
            },
        );
        if !result.is_ok() {
            warn!(
                topic,
                plugin = name,
                failures = result.errors.len(),
                "Lifecycle event subscribers failed"
            );
        }
    }

    // ─── Bulk lifecycle ─────────────────────────────────────────────────────

    /// Brings every plugin as far as `Started`.
    ///
    /// `Discovered` plugins are loaded, initialized and started, `Stopped`
    /// plugins are restarted, and plugins already `Started`, `Failed` or
    /// `Unloaded` are left alone. Inspect [`status`](Self::status) afterwards
    /// to see which plugins failed.
    pub async fn start_all(&self) {
        let slots = self.snapshot();
        let waves = startup_waves(&slots);
        info!(plugins = slots.len(), waves = waves.len(), "Starting plugins");

        for wave in &waves {
            future::join_all(wave.iter().map(|&i| self.bring_up(&slots[i]))).await;
        }

        let (started, failed) = tally(&slots);
        info!(started, failed, "Plugin startup finished");
    }

    async fn bring_up(&self, slot: &PluginSlot) {
        loop {
            let stage = match slot.state() {
                PluginState::Discovered => Stage::Load,
                PluginState::Loaded => Stage::Init,
                PluginState::Initialized | PluginState::Stopped => Stage::Start,
                PluginState::Started | PluginState::Unloaded | PluginState::Failed => return,
            };
            if let Err(err) = self.step(slot, stage).await {
                debug!(plugin = slot.name(), error = %err, "Plugin startup halted");
                return;
            }
        }
    }

    /// Stops every `Started` plugin, dependents before their providers.
    pub async fn stop_all(&self) {
        let slots = self.snapshot();
        let waves = startup_waves(&slots);
        info!(plugins = slots.len(), "Stopping plugins");

        for wave in waves.iter().rev() {
            future::join_all(wave.iter().map(|&i| self.wind_down(&slots[i]))).await;
        }
    }

    async fn wind_down(&self, slot: &PluginSlot) {
        if slot.state() == PluginState::Started {
            let _ = self.step(slot, Stage::Stop).await;
        }
    }

    /// Stops and unloads every plugin that can reach `Unloaded`.
    ///
    /// Plugins that were never started cannot be unloaded and are skipped.
    pub async fn unload_all(&self) {
        let slots = self.snapshot();
        let waves = startup_waves(&slots);
        info!(plugins = slots.len(), "Unloading plugins");

        for wave in waves.iter().rev() {
            future::join_all(wave.iter().map(|&i| self.tear_down(&slots[i]))).await;
        }
    }

    async fn tear_down(&self, slot: &PluginSlot) {
        if slot.state() == PluginState::Started && self.step(slot, Stage::Stop).await.is_err() {
            return;
        }
        match slot.state() {
            PluginState::Stopped => {
                let _ = self.step(slot, Stage::Unload).await;
            }
            PluginState::Unloaded | PluginState::Failed => {}
            state => debug!(plugin = slot.name(), state = %state, "Plugin cannot be unloaded"),
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    pub fn status(&self, name: &str) -> Option<PluginState> {
        self.slot(name).ok().map(|slot| slot.state())
    }

    /// The error that moved the plugin to `Failed`, if any.
    pub fn last_error(&self, name: &str) -> Option<Arc<PluginLifecycleError>> {
        self.slot(name).ok()?.status.lock().last_error.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slot(name).is_ok()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.slots.read().iter().map(|s| s.name().to_owned()).collect()
    }

    /// Summaries of every plugin in registration order.
    pub fn plugins(&self) -> Vec<PluginSummary> {
        self.snapshot()
            .iter()
            .map(|slot| {
                let status = slot.status.lock();
                PluginSummary {
                    name: slot.name().to_owned(),
                    state: status.state,
                    metadata: slot.descriptor.metadata().clone(),
                    priority: slot.descriptor.startup_priority(),
                    dependencies: slot
                        .descriptor
                        .dependencies()
                        .iter()
                        .map(|key| key.as_str().to_owned())
                        .collect(),
                    last_error: status.last_error.as_ref().map(|e| e.source.to_string()),
                }
            })
            .collect()
    }

    fn slot(&self, name: &str) -> PluginResult<Arc<PluginSlot>> {
        self.slots
            .read()
            .iter()
            .find(|slot| slot.name() == name)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(name.to_owned()))
    }

    fn snapshot(&self) -> Vec<Arc<PluginSlot>> {
        self.slots.read().clone()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish_non_exhaustive()
    }
}

async fn run_hook(instance: &LiveInstance, stage: Stage) -> HookResult {
    let LiveInstance { plugin, ctx } = instance;
    let hook = match stage {
        Stage::Init => plugin.on_init(ctx),
        Stage::Start => plugin.on_start(ctx),
        Stage::Stop => plugin.on_stop(ctx),
        Stage::Unload => plugin.on_unload(ctx),
        Stage::Load => return Ok(()),
    };

    AssertUnwindSafe(hook)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(PanicError::from_payload(payload).into()))
}

fn tally(slots: &[Arc<PluginSlot>]) -> (usize, usize) {
    slots.iter().fold((0, 0), |(started, failed), slot| match slot.state() {
        PluginState::Started => (started + 1, failed),
        PluginState::Failed => (started, failed + 1),
        _ => (started, failed),
    })
}

// ─── Ordering ─────────────────────────────────────────────────────────────────

/// Groups of plugins that start together, in startup order.
///
/// Each dependency layer is split by priority, lowest first. When the
/// providers form a cycle every plugin gets its own wave, ordered by
/// priority and then registration order.
fn startup_waves(slots: &[Arc<PluginSlot>]) -> Vec<Vec<usize>> {
    let priority = |i: usize| slots[i].descriptor.startup_priority();

    match topological_layers(slots) {
        Ok(layers) => layers
            .into_iter()
            .flat_map(|mut layer| {
                layer.sort_by_key(|&i| priority(i));
                let groups: Vec<Vec<usize>> = layer
                    .chunk_by(|&a, &b| priority(a) == priority(b))
                    .map(<[usize]>::to_vec)
                    .collect();
                groups
            })
            .collect(),
        Err(cycle) => {
            error!(
                plugins = %cycle.join(", "),
                "Plugin dependency cycle detected; falling back to priority order"
            );
            let mut order: Vec<usize> = (0..slots.len()).collect();
            order.sort_by_key(|&i| priority(i));
            order.into_iter().map(|i| vec![i]).collect()
        }
    }
}

/// Groups plugins into layers with Kahn's algorithm.
///
/// Layer 0 holds every plugin none of whose dependencies is provided by
/// another plugin. Indices within a layer keep registration order. Returns
/// the names of the plugins stuck on a cycle on failure.
fn topological_layers(slots: &[Arc<PluginSlot>]) -> Result<Vec<Vec<usize>>, Vec<String>> {
    let n = slots.len();

    let mut providers: HashMap<&str, usize> = HashMap::new();
    for (i, slot) in slots.iter().enumerate() {
        for key in slot.descriptor.provided() {
            if let Some(prev) = providers.insert(key.as_str(), i) {
                warn!(
                    service = %key,
                    previous = slots[prev].name(),
                    provider = slot.name(),
                    "Service provided by several plugins; the last one orders startup"
                );
            }
        }
    }

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, slot) in slots.iter().enumerate() {
        for key in slot.descriptor.dependencies() {
            match providers.get(key.as_str()) {
                Some(&provider) if provider != i => {
                    dependents[provider].push(i);
                    in_degree[i] += 1;
                }
                Some(_) => {}
                None => debug!(
                    plugin = slot.name(),
                    dependency = %key,
                    "Dependency not provided by any plugin; expecting a host service"
                ),
            }
        }
    }

    let mut layers = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = 0;

    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        layers.push(current);
        current = next;
    }

    if placed == n {
        Ok(layers)
    } else {
        Err((0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| slots[i].name().to_owned())
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
