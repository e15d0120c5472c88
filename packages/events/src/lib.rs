//! Concord-Events: Domain Event Bus
//!
//! In-process subscribe/dispatch of domain events. Handlers receive events
//! in subscription order; `dispatch` is awaitable so callers can rely on
//! "decision persisted, then events observed" ordering.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventHandler, RecordingHandler};
pub use event::{event_types, DomainEvent};
