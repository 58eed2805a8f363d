//! Topic-based publish/subscribe.
//!
//! Handlers subscribe to an exact topic string, or to every topic via
//! [`EventBus::subscribe_all`]. Each subscription is either synchronous or
//! asynchronous:
//!
//! - **Sync** handlers run inline during [`EventBus::publish`], in
//!   subscription order. Their errors (and panics) are captured into the
//!   returned [`PublishResult`]; one failing handler never stops the rest.
//! - **Async** handlers are spawned on the bus executor. `publish` counts them
//!   as dispatched and returns without waiting; failures are logged and
//!   counted. [`EventBus::wait_idle`] waits for every spawned handler.
//!
//! Middleware added with [`EventBus::add_middleware`] sees every event before
//! delivery, in insertion order. It may rewrite the event or drop it.
//!
//! `publish` works on a snapshot of the subscriber list taken under a read
//! lock, so handlers may subscribe or unsubscribe while being invoked. Such
//! changes apply from the next `publish` onward.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! let id = bus.subscribe_sync("user.created", |event: &Event| {
//!     let name = event.payload::<String>().ok_or("unexpected payload")?;
//!     println!("welcome {name}");
//!     Ok(())
//! })?;
//!
//! let result = bus.publish("user.created", String::from("ada"));
//! assert_eq!(result.handled_count, 1);
//! bus.unsubscribe(id);
//! ```

mod event;
mod handler;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace, warn};

pub use event::Event;
pub use handler::{AsyncEventHandler, DeliveryMode, EventHandler, Handler, HandlerResult};

use crate::container::ServiceKey;
use crate::error::{BoxError, BusError, BusResult, PanicError};

/// Opaque handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A synchronous handler failure captured during `publish`.
#[derive(Debug)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub error: BoxError,
}

/// Outcome of one `publish` call.
#[derive(Debug, Default)]
pub struct PublishResult {
    /// Synchronous handlers that ran, whether or not they succeeded.
    pub handled_count: usize,
    /// Asynchronous handlers that were spawned.
    pub dispatched_count: usize,
    /// Failures of synchronous handlers, in invocation order.
    pub errors: Vec<HandlerFailure>,
}

impl PublishResult {
    /// True when no synchronous handler failed.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total handlers reached by the publish.
    pub fn delivered(&self) -> usize {
        self.handled_count + self.dispatched_count
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// Where a subscription lives, for O(1) lookup on unsubscribe.
#[derive(Clone)]
enum Slot {
    Topic(Arc<str>),
    Wildcard,
}

#[derive(Default)]
struct SubscriberTable {
    by_topic: HashMap<Arc<str>, Vec<Subscription>>,
    wildcard: Vec<Subscription>,
    index: HashMap<SubscriptionId, Slot>,
}

/// Rewrites or drops an event before delivery. `None` drops it.
pub type Middleware = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

struct BusInner {
    table: RwLock<SubscriberTable>,
    middleware: RwLock<Vec<Middleware>>,
    next_id: AtomicU64,
    executor: Option<Handle>,
    tracker: TaskTracker,
    async_failures: AtomicU64,
}

/// The event bus. Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Key under which the runtime registers its bus in the container.
    pub const KEY: ServiceKey = ServiceKey::from_static("anvil.event_bus");

    /// Creates a bus that spawns async handlers on the current tokio runtime.
    ///
    /// Outside a runtime the bus is created without an executor and rejects
    /// async subscriptions.
    pub fn new() -> Self {
        Self::build(Handle::try_current().ok())
    }

    /// Creates a bus that spawns async handlers on `handle`.
    pub fn with_executor(handle: Handle) -> Self {
        Self::build(Some(handle))
    }

    /// Creates a bus that only accepts synchronous handlers.
    pub fn sync_only() -> Self {
        Self::build(None)
    }

    fn build(executor: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                table: RwLock::new(SubscriberTable::default()),
                middleware: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                executor,
                tracker: TaskTracker::new(),
                async_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Whether async subscriptions are accepted.
    pub fn supports_async(&self) -> bool {
        self.inner.executor.is_some()
    }

    // ─── Subscribing ────────────────────────────────────────────────────────

    /// Subscribes `handler` to `topic`.
    ///
    /// Fails with [`BusError::InvalidHandler`] for an empty topic, or for an
    /// async handler on a bus without an executor.
    pub fn subscribe(&self, topic: &str, handler: Handler) -> BusResult<SubscriptionId> {
        if topic.is_empty() {
            return Err(BusError::InvalidHandler {
                topic: String::new(),
                reason: "topic must not be empty",
            });
        }
        self.insert(Slot::Topic(Arc::from(topic)), handler)
    }

    pub fn subscribe_sync<F>(&self, topic: &str, handler: F) -> BusResult<SubscriptionId>
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(topic, Handler::from_fn(handler))
    }

    pub fn subscribe_async<F, Fut>(&self, topic: &str, handler: F) -> BusResult<SubscriptionId>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe(topic, Handler::from_async_fn(handler))
    }

    /// Subscribes `handler` to every topic.
    ///
    /// On each publish, wildcard subscribers run after the topic's own
    /// subscribers.
    pub fn subscribe_all(&self, handler: Handler) -> BusResult<SubscriptionId> {
        self.insert(Slot::Wildcard, handler)
    }

    fn insert(&self, slot: Slot, handler: Handler) -> BusResult<SubscriptionId> {
        if handler.mode() == DeliveryMode::Async && self.inner.executor.is_none() {
            return Err(BusError::InvalidHandler {
                topic: slot_name(&slot).to_owned(),
                reason: "async handlers need a tokio runtime",
            });
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mode = handler.mode();
        let subscription = Subscription { id, handler };

        let mut table = self.inner.table.write();
        match &slot {
            Slot::Topic(topic) => table
                .by_topic
                .entry(Arc::clone(topic))
                .or_default()
                .push(subscription),
            Slot::Wildcard => table.wildcard.push(subscription),
        }
        debug!(topic = slot_name(&slot), subscription = %id, mode = ?mode, "Subscribed");
        table.index.insert(id, slot);
        Ok(id)
    }

    /// Removes a subscription. Returns whether it existed.
    ///
    /// Unknown or already removed ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.inner.table.write();
        let Some(slot) = table.index.remove(&id) else {
            return false;
        };

        match &slot {
            Slot::Topic(topic) => {
                if let Some(list) = table.by_topic.get_mut(topic) {
                    list.retain(|s| s.id != id);
                    if list.is_empty() {
                        table.by_topic.remove(topic);
                    }
                }
            }
            Slot::Wildcard => table.wildcard.retain(|s| s.id != id),
        }
        debug!(topic = slot_name(&slot), subscription = %id, "Unsubscribed");
        true
    }

    /// Number of subscriptions on exactly `topic`, excluding wildcards.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .table
            .read()
            .by_topic
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Number of live subscriptions, wildcards included.
    pub fn total_subscribers(&self) -> usize {
        self.inner.table.read().index.len()
    }

    // ─── Publishing ─────────────────────────────────────────────────────────

    /// Publishes `payload` on `topic`.
    ///
    /// Publishing to a topic without subscribers succeeds with zero counts.
    pub fn publish<P>(&self, topic: &str, payload: P) -> PublishResult
    where
        P: std::any::Any + Send + Sync,
    {
        self.publish_event(Event::new(topic, payload))
    }

    /// Publishes a pre-built event.
    ///
    /// Middleware runs first; a dropped event reaches no handler.
    pub fn publish_event(&self, event: Event) -> PublishResult {
        let Some(event) = self.apply_middleware(event) else {
            return PublishResult::default();
        };
        let snapshot = self.snapshot(event.topic());
        let mut result = PublishResult::default();

        trace!(
            topic = event.topic(),
            event_id = %event.id(),
            subscribers = snapshot.len(),
            "Publishing event"
        );

        for subscription in snapshot {
            match subscription.handler {
                Handler::Sync(handler) => {
                    result.handled_count += 1;
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event)))
                        .unwrap_or_else(|payload| Err(PanicError::from_payload(payload).into()));
                    if let Err(error) = outcome {
                        warn!(
                            topic = event.topic(),
                            subscription = %subscription.id,
                            error = %error,
                            "Event handler failed"
                        );
                        result.errors.push(HandlerFailure {
                            subscription: subscription.id,
                            error,
                        });
                    }
                }
                Handler::Async(handler) => {
                    if self.spawn(subscription.id, handler, event.clone()) {
                        result.dispatched_count += 1;
                    }
                }
            }
        }
        result
    }

    /// Appends `middleware` to the chain run on every publish.
    ///
    /// A panicking middleware is logged and skipped; the event continues
    /// unchanged to the next one.
    pub fn add_middleware<F>(&self, middleware: F)
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        let mut chain = self.inner.middleware.write();
        chain.push(Arc::new(middleware));
        debug!(position = chain.len(), "Middleware added");
    }

    /// Number of middleware in the chain.
    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.read().len()
    }

    fn apply_middleware(&self, mut event: Event) -> Option<Event> {
        let chain = self.inner.middleware.read().clone();
        for (position, middleware) in chain.iter().enumerate() {
            let original = event.clone();
            match panic::catch_unwind(AssertUnwindSafe(|| middleware(event))) {
                Ok(Some(next)) => event = next,
                Ok(None) => {
                    trace!(topic = original.topic(), position, "Event dropped by middleware");
                    return None;
                }
                Err(payload) => {
                    warn!(
                        topic = original.topic(),
                        position,
                        error = %PanicError::from_payload(payload),
                        "Middleware panicked"
                    );
                    event = original;
                }
            }
        }
        Some(event)
    }

    fn snapshot(&self, topic: &str) -> Vec<Subscription> {
        let table = self.inner.table.read();
        table
            .by_topic
            .get(topic)
            .into_iter()
            .flatten()
            .chain(table.wildcard.iter())
            .cloned()
            .collect()
    }

    fn spawn(&self, id: SubscriptionId, handler: Arc<dyn AsyncEventHandler>, event: Event) -> bool {
        let Some(executor) = &self.inner.executor else {
            error!(subscription = %id, "Async handler registered on a bus without executor");
            return false;
        };

        let inner = Arc::clone(&self.inner);
        let topic = event.topic().to_owned();
        let task = AssertUnwindSafe(async move { handler.handle(event).await }).catch_unwind();

        self.inner.tracker.spawn_on(
            async move {
                let error: BoxError = match task.await {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => error,
                    Err(payload) => PanicError::from_payload(payload).into(),
                };
                inner.async_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    topic = %topic,
                    subscription = %id,
                    error = %error,
                    "Async event handler failed"
                );
            },
            executor,
        );
        true
    }

    /// Waits until every async handler spawned so far has finished.
    pub async fn wait_idle(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Number of async handler failures since the bus was created.
    pub fn async_failure_count(&self) -> u64 {
        self.inner.async_failures.load(Ordering::Relaxed)
    }

    /// Number of async handlers still running.
    pub fn pending_tasks(&self) -> usize {
        self.inner.tracker.len()
    }
}

fn slot_name(slot: &Slot) -> &str {
    match slot {
        Slot::Topic(topic) => topic,
        Slot::Wildcard => "*",
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.total_subscribers())
            .field("async", &self.supports_async())
            .field("middleware", &self.middleware_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Rejected(&'static str);

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler {
        let log = Arc::clone(log);
        Handler::from_fn(move |event: &Event| {
            log.lock().unwrap().push(format!("{tag}:{}", event.topic()));
            Ok(())
        })
    }

    #[test]
    fn test_sync_handlers_run_in_subscription_order() {
        let bus = EventBus::sync_only();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("order.placed", recorder(&log, "first")).unwrap();
        bus.subscribe("order.placed", recorder(&log, "second")).unwrap();
        bus.subscribe("order.cancelled", recorder(&log, "other")).unwrap();

        let result = bus.publish("order.placed", 42u32);

        assert_eq!(result.handled_count, 2);
        assert!(result.is_ok());
        assert_eq!(
            *log.lock().unwrap(),
            ["first:order.placed", "second:order.placed"]
        );
    }

    #[test]
    fn test_failing_handler_does_not_stop_fan_out() {
        let bus = EventBus::sync_only();
        let calls = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let calls = Arc::clone(&calls);
            bus.subscribe_sync("job", move |_: &Event| {
                calls.fetch_add(1, Ordering::SeqCst);
                if i == 1 {
                    return Err(Rejected("second handler").into());
                }
                Ok(())
            })
            .unwrap();
        }

        let result = bus.publish("job", ());

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.handled_count, 3);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error.to_string(), "second handler");
    }

    #[test]
    fn test_panicking_handler_is_captured() {
        let bus = EventBus::sync_only();
        let id = bus
            .subscribe_sync("boom", |_: &Event| -> HandlerResult { panic!("handler exploded") })
            .unwrap();
        bus.subscribe_sync("boom", |_: &Event| Ok(())).unwrap();

        let result = bus.publish("boom", ());

        assert_eq!(result.handled_count, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].subscription, id);
        assert!(result.errors[0].error.to_string().contains("handler exploded"));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::sync_only();
        let result = bus.publish("nobody.listens", "hello");
        assert_eq!(result.delivered(), 0);
        assert!(result.is_ok());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::sync_only();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe("tick", recorder(&log, "a")).unwrap();

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count("tick"), 0);
        assert_eq!(bus.publish("tick", ()).handled_count, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_wildcard_runs_after_topic_subscribers() {
        let bus = EventBus::sync_only();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe_all(recorder(&log, "all")).unwrap();
        bus.subscribe("a", recorder(&log, "a")).unwrap();

        bus.publish("a", ());
        bus.publish("b", ());

        assert_eq!(*log.lock().unwrap(), ["a:a", "all:a", "all:b"]);
        assert_eq!(bus.subscriber_count("a"), 1);
        assert_eq!(bus.total_subscribers(), 2);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself_during_publish() {
        let bus = EventBus::sync_only();
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<SubscriptionId>));

        let handle = bus.clone();
        let counter = Arc::clone(&calls);
        let slot = Arc::clone(&own_id);
        let id = bus
            .subscribe_sync("once", move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock().unwrap() {
                    handle.unsubscribe(id);
                }
                Ok(())
            })
            .unwrap();
        *own_id.lock().unwrap() = Some(id);

        bus.publish("once", ());
        bus.publish("once", ());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_middleware_runs_in_order_before_delivery() {
        let bus = EventBus::sync_only();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("order.audited", recorder(&log, "handler")).unwrap();
        bus.subscribe("order.placed", recorder(&log, "stale")).unwrap();

        let trail = Arc::clone(&log);
        bus.add_middleware(move |event: Event| {
            trail.lock().unwrap().push(format!("first:{}", event.topic()));
            Some(event.with_topic("order.audited"))
        });
        let trail = Arc::clone(&log);
        bus.add_middleware(move |event: Event| {
            trail.lock().unwrap().push(format!("second:{}", event.topic()));
            let amount = event.payload::<u32>().copied().unwrap_or_default();
            Some(event.with_payload(amount * 2))
        });

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        bus.subscribe_sync("order.audited", move |event: &Event| {
            *sink.lock().unwrap() = event.payload::<u32>().copied();
            Ok(())
        })
        .unwrap();

        let result = bus.publish("order.placed", 21u32);

        assert_eq!(bus.middleware_count(), 2);
        assert_eq!(result.handled_count, 2);
        assert_eq!(
            *log.lock().unwrap(),
            ["first:order.placed", "second:order.audited", "handler:order.audited"]
        );
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[test]
    fn test_middleware_can_drop_events() {
        let bus = EventBus::sync_only();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("metrics", recorder(&log, "sink")).unwrap();
        bus.add_middleware(|event: Event| (!event.payload_is::<()>()).then_some(event));

        let dropped = bus.publish("metrics", ());
        let kept = bus.publish("metrics", 1u8);

        assert_eq!(dropped.delivered(), 0);
        assert_eq!(kept.handled_count, 1);
        assert_eq!(*log.lock().unwrap(), ["sink:metrics"]);
    }

    #[test]
    fn test_panicking_middleware_is_skipped() {
        let bus = EventBus::sync_only();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("job", recorder(&log, "worker")).unwrap();
        bus.add_middleware(|_: Event| -> Option<Event> { panic!("middleware exploded") });
        bus.add_middleware(|event: Event| Some(event.with_payload("tagged")));

        let seen = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&seen);
        bus.subscribe_sync("job", move |event: &Event| {
            *sink.lock().unwrap() = event.payload_is::<&str>();
            Ok(())
        })
        .unwrap();

        let result = bus.publish("job", 0u8);

        assert_eq!(result.handled_count, 2);
        assert!(result.is_ok());
        assert!(*seen.lock().unwrap());
    }

    #[test]
    fn test_payload_downcast() {
        let bus = EventBus::sync_only();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        bus.subscribe_sync("user.created", move |event: &Event| {
            let name = event.payload::<String>().ok_or("unexpected payload")?;
            *sink.lock().unwrap() = Some(name.clone());
            Ok(())
        })
        .unwrap();

        assert!(bus.publish("user.created", String::from("ada")).is_ok());
        assert!(!bus.publish("user.created", 7u8).is_ok());
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ada"));
    }

    #[test]
    fn test_invalid_handlers_rejected() {
        let bus = EventBus::sync_only();
        assert!(matches!(
            bus.subscribe_sync("", |_: &Event| Ok(())),
            Err(BusError::InvalidHandler { .. })
        ));
        assert!(matches!(
            bus.subscribe_async("work", |_event: Event| async { Ok(()) }),
            Err(BusError::InvalidHandler { .. })
        ));
        assert_eq!(bus.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_async_handlers_are_dispatched_and_awaited() {
        let bus = EventBus::new();
        let done = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&done);
        bus.subscribe_async("work", move |event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                assert_eq!(event.payload::<u32>(), Some(&5));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();
        bus.subscribe_async("work", |_event: Event| async {
            Err::<(), BoxError>(Rejected("async failure").into())
        })
        .unwrap();

        let result = bus.publish("work", 5u32);
        assert_eq!(result.handled_count, 0);
        assert_eq!(result.dispatched_count, 2);
        assert!(result.is_ok());

        bus.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(bus.async_failure_count(), 1);
        assert_eq!(bus.pending_tasks(), 0);

        // The bus keeps accepting work after waiting.
        bus.publish("work", 5u32);
        bus.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    async fn explode(_event: Event) -> HandlerResult {
        panic!("async boom")
    }

    #[tokio::test]
    async fn test_async_panic_is_counted() {
        let bus = EventBus::new();
        bus.subscribe_async("explode", explode).unwrap();

        bus.publish("explode", ());
        bus.wait_idle().await;
        assert_eq!(bus.async_failure_count(), 1);
    }

    #[test]
    fn test_concurrent_publish_and_subscribe() {
        let bus = EventBus::sync_only();
        let hits = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let hits = Arc::clone(&hits);
                        let id = bus
                            .subscribe_sync("load", move |_: &Event| {
                                hits.fetch_add(1, Ordering::Relaxed);
                                Ok(())
                            })
                            .unwrap();
                        bus.publish("load", ());
                        bus.unsubscribe(id);
                    }
                });
            }
        });

        assert_eq!(bus.total_subscribers(), 0);
        assert!(hits.load(Ordering::Relaxed) >= 200);
    }
}
