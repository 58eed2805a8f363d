use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::Event;
use crate::error::BoxError;

/// Result returned by event handlers.
pub type HandlerResult = Result<(), BoxError>;

/// A handler run inline on the publisher's thread.
///
/// Implemented for every `Fn(&Event) -> HandlerResult` closure.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: &Event) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) -> HandlerResult {
        self(event)
    }
}

/// A handler whose work is spawned onto the bus executor.
///
/// Implemented for every `Fn(Event) -> impl Future<Output = HandlerResult>` closure.
pub trait AsyncEventHandler: Send + Sync + 'static {
    fn handle(&self, event: Event) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> AsyncEventHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(event))
    }
}

/// How a subscription is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Invoked inline during `publish`; its outcome is part of the result.
    Sync,
    /// Spawned during `publish`; its outcome is only logged.
    Async,
}

/// A subscribed handler together with its delivery mode.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<dyn EventHandler>),
    Async(Arc<dyn AsyncEventHandler>),
}

impl Handler {
    /// Wraps a synchronous closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps a closure returning a future.
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Async(Arc::new(f))
    }

    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::Sync(_) => DeliveryMode::Sync,
            Self::Async(_) => DeliveryMode::Async,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.mode()).finish()
    }
}
