//! The notification bus: publish/subscribe mechanics used to trigger
//! OnCapture subscriptions after a Capture commits (spec.md §4.8).
//!
//! Deliberately thin: no event sourcing, no aggregate streams, no command
//! dispatch. A Capture is the durable record; this crate only carries the
//! "something committed" signal across the process boundary between
//! `epcis-capture` and `epcis-subscriptions`.

pub mod bus;
pub mod in_memory_bus;
pub mod notification;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::RepositoryNotification;
pub use tenant::TenantScoped;
