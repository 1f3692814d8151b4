//! Event system for server push notifications.
//!
//! The event bus provides:
//! - A registry of listeners keyed by event type
//! - Fan-out of each pushed envelope to every listener of its type
//! - Debounced refresh triggers for views that refetch on push
//!
//! # Architecture
//!
//! Frames flow from the socket → `Connection` driver → `EventBus`:
//! - `EventBus`: parses `{type, data}` envelopes and invokes listeners
//! - `Debouncer`: collapses bursts of signals into one trailing action
//! - Push events are invalidation hints only; nothing is queued while the
//!   socket is down

mod debounce;
mod event_bus;
pub mod event_types;

pub use debounce::{DebounceTrigger, Debouncer, DEFAULT_DEBOUNCE_WINDOW};
pub use event_bus::{BusError, EventBus, EventEnvelope, Subscription};
