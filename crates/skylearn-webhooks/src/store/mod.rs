//! Persistence seam for the webhook engine.
//!
//! `WebhookStore` abstracts over subscription storage, the append-only
//! delivery attempt log, and the durable retry queue. The Postgres
//! implementation backs production; the in-memory implementation backs tests
//! and embedded use.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WebhookError;
use skylearn_db::models::{
    NewWebhookDeliveryAttempt, NewWebhookPendingDelivery, UpdateWebhookSubscription,
    WebhookDeliveryAttempt, WebhookPendingDelivery, WebhookSubscription,
};

pub use memory::MemoryStore;
pub use postgres::PgWebhookStore;

/// Storage operations required by the registry, router, executor, and
/// retry worker.
#[async_trait::async_trait]
pub trait WebhookStore: Send + Sync {
    // --- Subscriptions ---

    async fn insert_subscription(&self, sub: WebhookSubscription) -> Result<(), WebhookError>;

    async fn get_subscription(&self, id: Uuid)
        -> Result<Option<WebhookSubscription>, WebhookError>;

    async fn list_by_owner(&self, owner_id: Uuid)
        -> Result<Vec<WebhookSubscription>, WebhookError>;

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, WebhookError>;

    /// Apply a partial update; returns the updated subscription, or `None`
    /// if it does not exist.
    async fn update_subscription(
        &self,
        id: Uuid,
        changes: UpdateWebhookSubscription,
    ) -> Result<Option<WebhookSubscription>, WebhookError>;

    /// Replace the encrypted signing secret. Returns false if the
    /// subscription does not exist.
    async fn set_secret(&self, id: Uuid, secret_encrypted: String) -> Result<bool, WebhookError>;

    /// Delete a subscription and cascade to its attempt log and pending
    /// retries. Returns false if it does not exist.
    async fn delete_subscription(&self, id: Uuid) -> Result<bool, WebhookError>;

    /// All active subscriptions whose event set contains `event`.
    async fn find_active_by_event(
        &self,
        event: &str,
    ) -> Result<Vec<WebhookSubscription>, WebhookError>;

    // --- Health counters ---

    /// Reset `consecutive_failures` to 0 and stamp `last_success_at`.
    async fn record_success(&self, id: Uuid) -> Result<(), WebhookError>;

    /// Atomically increment `consecutive_failures`, stamp `last_failure_at`,
    /// and return the new counter value.
    async fn record_failure(&self, id: Uuid) -> Result<i32, WebhookError>;

    /// Reset `consecutive_failures` to 0 without recording a success
    /// (manual re-enable).
    async fn reset_failures(&self, id: Uuid) -> Result<(), WebhookError>;

    /// Set `active = false`.
    async fn deactivate(&self, id: Uuid) -> Result<(), WebhookError>;

    // --- Delivery attempt log ---

    async fn insert_attempt(
        &self,
        attempt: NewWebhookDeliveryAttempt,
    ) -> Result<WebhookDeliveryAttempt, WebhookError>;

    async fn list_attempts(
        &self,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDeliveryAttempt>, WebhookError>;

    // --- Retry queue ---

    async fn enqueue_retry(&self, retry: NewWebhookPendingDelivery) -> Result<(), WebhookError>;

    /// Claim up to `batch` deliveries due at or before `now`, removing them
    /// from the queue.
    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        batch: i64,
    ) -> Result<Vec<WebhookPendingDelivery>, WebhookError>;
}
