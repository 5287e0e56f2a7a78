//! Webhook delivery attempt log model.
//!
//! Append-only: one row per HTTP delivery attempt, including retries.
//! Rows are never updated after insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// One logged delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDeliveryAttempt {
    /// Unique identifier.
    pub id: Uuid,
    /// Subscription this attempt was delivered for.
    pub subscription_id: Uuid,
    /// Event name.
    pub event: String,
    /// Exact JSON body that was sent.
    pub payload: JsonValue,
    /// 1-based attempt number within the delivery cycle.
    pub attempt_number: i32,
    /// HTTP status code, or 0 for transport-level failures.
    pub response_code: i32,
    /// Response body or error message, truncated.
    pub response_body: String,
    /// "success" or "failure".
    pub outcome: String,
    pub created_at: DateTime<Utc>,
}

/// Input for logging a delivery attempt.
#[derive(Debug, Clone)]
pub struct NewWebhookDeliveryAttempt {
    pub subscription_id: Uuid,
    pub event: String,
    pub payload: JsonValue,
    pub attempt_number: i32,
    pub response_code: i32,
    pub response_body: String,
    pub outcome: String,
}

const ATTEMPT_COLUMNS: &str = "id, subscription_id, event, payload, attempt_number, \
     response_code, response_body, outcome, created_at";

impl WebhookDeliveryAttempt {
    /// Append a delivery attempt row.
    pub async fn create<'e, E>(
        executor: E,
        input: NewWebhookDeliveryAttempt,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            INSERT INTO webhook_delivery_attempts
                (id, subscription_id, event, payload, attempt_number,
                 response_code, response_body, outcome)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ATTEMPT_COLUMNS}
            ",
        ))
        .bind(Uuid::new_v4())
        .bind(input.subscription_id)
        .bind(input.event)
        .bind(input.payload)
        .bind(input.attempt_number)
        .bind(input.response_code)
        .bind(input.response_body)
        .bind(input.outcome)
        .fetch_one(executor)
        .await
    }

    /// List attempts for a subscription, newest first.
    pub async fn list_by_subscription<'e, E>(
        executor: E,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {ATTEMPT_COLUMNS}
            FROM webhook_delivery_attempts
            WHERE subscription_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        ))
        .bind(subscription_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
    }
}
