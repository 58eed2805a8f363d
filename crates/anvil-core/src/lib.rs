//! # Anvil Core
//!
//! The two building blocks every Anvil application shares:
//!
//! - [`Container`]: a dependency-injection container with singleton and
//!   transient lifetimes, constructor injection through declared dependency
//!   keys, cycle detection and ordered disposal.
//! - [`EventBus`]: a topic-based publish/subscribe bus with synchronous
//!   handlers invoked inline and asynchronous handlers spawned on tokio.
//!
//! Plugins and their lifecycle live in `anvil-framework`; configuration,
//! logging and process bootstrap live in `anvil-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use anvil_core::{Container, EventBus, Lifetime, Registration};
//!
//! let container = Container::new();
//! container.add(Registration::singleton("Logger", |_| Ok(Logger::default())))?;
//! container.add(
//!     Registration::transient("Service", |deps| Ok(Service::new(deps.get("Logger")?)))
//!         .depends_on(["Logger"]),
//! )?;
//!
//! let service: Arc<Service> = container.resolve_as("Service")?;
//! ```

pub mod bus;
pub mod container;
pub mod error;

pub use bus::{
    AsyncEventHandler, DeliveryMode, Event, EventBus, EventHandler, Handler, HandlerFailure,
    HandlerResult, Middleware, PublishResult, SubscriptionId,
};
pub use container::{
    Container, Dependencies, Dispose, Instance, Lifetime, Registration, ServiceKey,
};
pub use error::{
    BoxError, BusError, BusResult, ContainerError, ContainerResult, DisposeError, PanicError,
};
