//! Webhook subscription model.
//!
//! A subscription binds an owner to a target URL and the set of event names
//! it wants delivered. Health counters (`consecutive_failures`, the last
//! success/failure timestamps) are mutated by the delivery pipeline; the
//! failure increment is a single atomic UPDATE so concurrent delivery
//! outcomes never lose updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// A registered webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookSubscription {
    /// Unique identifier.
    pub id: Uuid,
    /// Account that registered the subscription.
    pub owner_id: Uuid,
    /// Display label.
    pub name: String,
    /// Target URL for deliveries.
    pub url: String,
    /// Subscribed event names (subset of the fixed catalog).
    pub events: Vec<String>,
    /// AES-256-GCM encrypted signing secret.
    pub secret_encrypted: String,
    /// Whether the subscription receives deliveries.
    pub active: bool,
    /// Failures since the last successful delivery.
    pub consecutive_failures: i32,
    /// Last successful delivery, if any.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last failed delivery, if any.
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a subscription. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhookSubscription {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
}

const SUBSCRIPTION_COLUMNS: &str = "id, owner_id, name, url, events, secret_encrypted, active, \
     consecutive_failures, last_success_at, last_failure_at, created_at, updated_at";

impl WebhookSubscription {
    /// Insert a new subscription row.
    pub async fn create<'e, E>(executor: E, sub: &WebhookSubscription) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            INSERT INTO webhook_subscriptions
                (id, owner_id, name, url, events, secret_encrypted, active,
                 consecutive_failures, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SUBSCRIPTION_COLUMNS}
            ",
        ))
        .bind(sub.id)
        .bind(sub.owner_id)
        .bind(&sub.name)
        .bind(&sub.url)
        .bind(&sub.events)
        .bind(&sub.secret_encrypted)
        .bind(sub.active)
        .bind(sub.consecutive_failures)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .fetch_one(executor)
        .await
    }

    /// Find a subscription by ID.
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM webhook_subscriptions
            WHERE id = $1
            ",
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// List all subscriptions registered by an owner, newest first.
    pub async fn list_by_owner<'e, E>(executor: E, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM webhook_subscriptions
            WHERE owner_id = $1
            ORDER BY created_at DESC
            ",
        ))
        .bind(owner_id)
        .fetch_all(executor)
        .await
    }

    /// Count subscriptions registered by an owner.
    pub async fn count_by_owner<'e, E>(executor: E, owner_id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM webhook_subscriptions WHERE owner_id = $1
            ",
        )
        .bind(owner_id)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Find all active subscriptions whose event set contains `event`.
    ///
    /// Set membership on the `TEXT[]` column, never substring matching.
    pub async fn find_active_by_event<'e, E>(
        executor: E,
        event: &str,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM webhook_subscriptions
            WHERE active = TRUE AND $1 = ANY(events)
            ",
        ))
        .bind(event)
        .fetch_all(executor)
        .await
    }

    /// Apply a partial update. Returns the updated row, or `None` if the
    /// subscription does not exist.
    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(&format!(
            r"
            UPDATE webhook_subscriptions
            SET name = COALESCE($2, name),
                url = COALESCE($3, url),
                events = COALESCE($4, events),
                active = COALESCE($5, active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            ",
        ))
        .bind(id)
        .bind(input.name)
        .bind(input.url)
        .bind(input.events)
        .bind(input.active)
        .fetch_optional(executor)
        .await
    }

    /// Replace the encrypted signing secret. Returns false if the
    /// subscription does not exist.
    pub async fn set_secret<'e, E>(
        executor: E,
        id: Uuid,
        secret_encrypted: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET secret_encrypted = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(secret_encrypted)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a subscription. Attempt log rows and pending retries cascade.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            DELETE FROM webhook_subscriptions WHERE id = $1
            ",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful delivery: reset the failure counter and stamp
    /// `last_success_at`.
    pub async fn record_success<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET consecutive_failures = 0, last_success_at = NOW(), updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Record a failed delivery: atomic increment of the failure counter.
    /// Returns the new counter value.
    pub async fn record_failure<'e, E>(executor: E, id: Uuid) -> Result<i32, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (failures,): (i32,) = sqlx::query_as(
            r"
            UPDATE webhook_subscriptions
            SET consecutive_failures = consecutive_failures + 1,
                last_failure_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING consecutive_failures
            ",
        )
        .bind(id)
        .fetch_one(executor)
        .await?;

        Ok(failures)
    }

    /// Reset the failure counter without recording a success, used when a
    /// subscription is manually re-enabled.
    pub async fn reset_failures<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET consecutive_failures = 0, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Deactivate a subscription (manual or automatic disablement).
    pub async fn deactivate<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET active = FALSE, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
