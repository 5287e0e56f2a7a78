//! Postgres-backed store.
//!
//! Thin delegation to the `skylearn-db` models. Failure increments are a
//! single atomic UPDATE; retry claims use `DELETE … RETURNING` with
//! `SKIP LOCKED`, so pending retries survive restarts and are processed by
//! at most one worker.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::store::WebhookStore;
use skylearn_db::models::{
    NewWebhookDeliveryAttempt, NewWebhookPendingDelivery, UpdateWebhookSubscription,
    WebhookDeliveryAttempt, WebhookPendingDelivery, WebhookSubscription,
};

/// Postgres implementation of [`WebhookStore`].
#[derive(Clone)]
pub struct PgWebhookStore {
    pool: PgPool,
}

impl PgWebhookStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl WebhookStore for PgWebhookStore {
    async fn insert_subscription(&self, sub: WebhookSubscription) -> Result<(), WebhookError> {
        WebhookSubscription::create(&self.pool, &sub).await?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        id: Uuid,
    ) -> Result<Option<WebhookSubscription>, WebhookError> {
        Ok(WebhookSubscription::find_by_id(&self.pool, id).await?)
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        Ok(WebhookSubscription::list_by_owner(&self.pool, owner_id).await?)
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, WebhookError> {
        Ok(WebhookSubscription::count_by_owner(&self.pool, owner_id).await?)
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        changes: UpdateWebhookSubscription,
    ) -> Result<Option<WebhookSubscription>, WebhookError> {
        Ok(WebhookSubscription::update(&self.pool, id, changes).await?)
    }

    async fn set_secret(&self, id: Uuid, secret_encrypted: String) -> Result<bool, WebhookError> {
        Ok(WebhookSubscription::set_secret(&self.pool, id, &secret_encrypted).await?)
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<bool, WebhookError> {
        // Attempt log and pending retries cascade via foreign keys.
        Ok(WebhookSubscription::delete(&self.pool, id).await?)
    }

    async fn find_active_by_event(
        &self,
        event: &str,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        Ok(WebhookSubscription::find_active_by_event(&self.pool, event).await?)
    }

    async fn record_success(&self, id: Uuid) -> Result<(), WebhookError> {
        Ok(WebhookSubscription::record_success(&self.pool, id).await?)
    }

    async fn record_failure(&self, id: Uuid) -> Result<i32, WebhookError> {
        Ok(WebhookSubscription::record_failure(&self.pool, id).await?)
    }

    async fn reset_failures(&self, id: Uuid) -> Result<(), WebhookError> {
        Ok(WebhookSubscription::reset_failures(&self.pool, id).await?)
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), WebhookError> {
        Ok(WebhookSubscription::deactivate(&self.pool, id).await?)
    }

    async fn insert_attempt(
        &self,
        attempt: NewWebhookDeliveryAttempt,
    ) -> Result<WebhookDeliveryAttempt, WebhookError> {
        Ok(WebhookDeliveryAttempt::create(&self.pool, attempt).await?)
    }

    async fn list_attempts(
        &self,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDeliveryAttempt>, WebhookError> {
        Ok(
            WebhookDeliveryAttempt::list_by_subscription(&self.pool, subscription_id, limit, offset)
                .await?,
        )
    }

    async fn enqueue_retry(&self, retry: NewWebhookPendingDelivery) -> Result<(), WebhookError> {
        WebhookPendingDelivery::enqueue(&self.pool, retry).await?;
        Ok(())
    }

    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        batch: i64,
    ) -> Result<Vec<WebhookPendingDelivery>, WebhookError> {
        Ok(WebhookPendingDelivery::claim_due(&self.pool, now, batch).await?)
    }
}
