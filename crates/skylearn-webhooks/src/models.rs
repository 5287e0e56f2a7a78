//! Wire payloads and API types for the webhook engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use skylearn_db::models::WebhookSubscription;

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// The JSON envelope POSTed to a subscriber endpoint.
///
/// Serialized exactly once per attempt; the `X-Signature` header covers the
/// resulting bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    /// Event name from the catalog (or "test" for diagnostic deliveries).
    pub event: String,
    /// Event-specific payload, opaque to the engine.
    pub data: JsonValue,
    /// Unix seconds at signing time.
    pub timestamp: i64,
    /// Self-identifying metadata for the receiver. Absent on test deliveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookIdentity>,
}

/// The `webhook` block of a delivery envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookIdentity {
    pub id: Uuid,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Delivery outcome
// ---------------------------------------------------------------------------

/// Classification of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Failure => "failure",
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a diagnostic `test` delivery. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDeliveryOutcome {
    pub success: bool,
    /// HTTP status, or 0 for transport-level failures.
    pub response_code: i32,
    /// Response body or error message, truncated.
    pub response_body: String,
}

// ---------------------------------------------------------------------------
// Registry request/response types
// ---------------------------------------------------------------------------

/// Input for registering a new subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
}

/// Partial update for a subscription. The signing secret is not updatable
/// here; rotation is a distinct operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
}

/// Owner-visible view of a subscription. The secret is never included; only
/// the fact that one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub consecutive_failures: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub secret_set: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookSubscription> for SubscriptionResponse {
    fn from(sub: WebhookSubscription) -> Self {
        Self {
            id: sub.id,
            owner_id: sub.owner_id,
            name: sub.name,
            url: sub.url,
            events: sub.events,
            active: sub.active,
            consecutive_failures: sub.consecutive_failures,
            last_success_at: sub.last_success_at,
            last_failure_at: sub.last_failure_at,
            secret_set: !sub.secret_encrypted.is_empty(),
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

/// Response to a successful registration. The only place the plaintext
/// secret ever appears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSubscription {
    #[serde(flatten)]
    pub subscription: SubscriptionResponse,
    pub secret: String,
}
