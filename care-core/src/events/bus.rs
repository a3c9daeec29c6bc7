//! Event bus for side effects
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never fails the
//! caller: the outcome is returned as a [`SideEffect`] so it can be logged
//! and reported alongside the primary response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::{CareEvent, EventId};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Best-effort delivery outcome of one published event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SideEffect {
    Delivered {
        event_id: EventId,
        event_type: String,
        receivers: usize,
    },
    Undelivered {
        event_id: EventId,
        event_type: String,
        reason: String,
    },
}

impl SideEffect {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SideEffect::Delivered { .. })
    }

    pub fn event_id(&self) -> &str {
        match self {
            SideEffect::Delivered { event_id, .. } | SideEffect::Undelivered { event_id, .. } => {
                event_id
            }
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<CareEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: CareEvent) -> SideEffect {
        let event_type = event.event_type();
        let event_id = event.event_id().to_string();
        let subject_id = event.subject_id().to_string();

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event_type, %event_id, %subject_id, receivers, "Event published");
                SideEffect::Delivered {
                    event_id,
                    event_type: event_type.to_string(),
                    receivers,
                }
            }
            Err(_) => {
                warn!(event_type, %event_id, %subject_id, "Event published with no receivers");
                SideEffect::Undelivered {
                    event_id,
                    event_type: event_type.to_string(),
                    reason: "no subscribers".to_string(),
                }
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<CareEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to the events matching `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub subject_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject_id: &str) -> Self {
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &CareEvent) -> bool {
        if let Some(subject_id) = &self.subject_id {
            if event.subject_id() != subject_id {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that skips events outside its filter
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CareEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<CareEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    pub async fn recv(&mut self) -> Result<CareEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event already queued, without waiting
    pub fn try_recv(&mut self) -> Result<CareEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
