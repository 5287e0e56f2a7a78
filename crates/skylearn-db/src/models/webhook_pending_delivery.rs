//! Durable retry queue model.
//!
//! A pending delivery is a scheduled future attempt: the event data, the
//! attempt number it will perform, and the time it becomes due. Rows are
//! claimed (deleted and returned) by the retry worker, so a delivery is
//! processed by at most one worker even with several pollers running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// A scheduled future delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookPendingDelivery {
    /// Unique identifier.
    pub id: Uuid,
    /// Subscription the retry belongs to.
    pub subscription_id: Uuid,
    /// Event name.
    pub event: String,
    /// Event data; the envelope is rebuilt and re-signed at execution time.
    pub data: JsonValue,
    /// Attempt number this row will perform (1-based).
    pub attempt_number: i32,
    /// When the attempt becomes due.
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Input for scheduling a retry.
#[derive(Debug, Clone)]
pub struct NewWebhookPendingDelivery {
    pub subscription_id: Uuid,
    pub event: String,
    pub data: JsonValue,
    pub attempt_number: i32,
    pub due_at: DateTime<Utc>,
}

const PENDING_COLUMNS: &str =
    "id, subscription_id, event, data, attempt_number, due_at, created_at";

impl WebhookPendingDelivery {
    /// Enqueue a future delivery attempt.
    pub async fn enqueue<'e, E>(
        executor: E,
        input: NewWebhookPendingDelivery,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            INSERT INTO webhook_pending_deliveries
                (id, subscription_id, event, data, attempt_number, due_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PENDING_COLUMNS}
            ",
        ))
        .bind(Uuid::new_v4())
        .bind(input.subscription_id)
        .bind(input.event)
        .bind(input.data)
        .bind(input.attempt_number)
        .bind(input.due_at)
        .fetch_one(executor)
        .await
    }

    /// Claim up to `batch` due deliveries, removing them from the queue.
    ///
    /// `SKIP LOCKED` keeps concurrent pollers from claiming the same row.
    pub async fn claim_due<'e, E>(
        executor: E,
        now: DateTime<Utc>,
        batch: i64,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            DELETE FROM webhook_pending_deliveries
            WHERE id IN (
                SELECT id FROM webhook_pending_deliveries
                WHERE due_at <= $1
                ORDER BY due_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {PENDING_COLUMNS}
            ",
        ))
        .bind(now)
        .bind(batch)
        .fetch_all(executor)
        .await
    }
}
