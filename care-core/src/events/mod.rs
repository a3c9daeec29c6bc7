//! Event system for engine side effects
//!
//! The engine never writes to storage or notifies anyone directly. It
//! publishes [`CareEvent`]s; collaborators subscribe and apply them.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus, SideEffect};
pub use types::{CareEvent, EventId};
