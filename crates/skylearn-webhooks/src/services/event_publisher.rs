//! Typed event bus.
//!
//! Emitters publish fire-and-forget; the webhook worker subscribes and routes
//! each event to matching subscriptions. Publishing never blocks and never
//! surfaces delivery errors back to the emitter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::events::EventType;

/// A domain event flowing through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique id for this emission, for log correlation.
    pub event_id: Uuid,
    /// Catalog event name, e.g. `payment_success`.
    pub event: String,
    /// The user or system actor that triggered the event, if known.
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    /// Event-specific payload, delivered verbatim as the envelope `data`.
    pub data: JsonValue,
}

impl WebhookEvent {
    #[must_use]
    pub fn new(event_type: EventType, data: JsonValue) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event: event_type.as_str().to_string(),
            actor_id: None,
            occurred_at: Utc::now(),
            data,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

/// Broadcast-backed publisher handle. Cheap to clone.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<WebhookEvent>,
}

impl EventPublisher {
    /// Create a publisher and the first subscriber receiver.
    ///
    /// `capacity` bounds the in-flight buffer per receiver; a slow consumer
    /// that lags beyond it loses the oldest events and gets a `Lagged` error.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<WebhookEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event. A send with no live receivers is logged and
    /// dropped, never an error for the emitter.
    pub fn publish(&self, event: WebhookEvent) {
        let event_id = event.event_id;
        let name = event.event.clone();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(
                    target: "webhook_events",
                    event_id = %event_id,
                    event = %name,
                    receivers,
                    "Event published"
                );
            }
            Err(_) => {
                tracing::warn!(
                    target: "webhook_events",
                    event_id = %event_id,
                    event = %name,
                    "Event dropped: no active subscribers"
                );
            }
        }
    }

    /// Open an additional subscription to the bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WebhookEvent> {
        self.sender.subscribe()
    }
}
