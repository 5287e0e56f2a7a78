//! In-memory store for tests and embedded use.
//!
//! Not durable: pending retries are lost on process exit. Counter updates
//! run under a single write lock, so increments are atomic with respect to
//! concurrent delivery outcomes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::WebhookError;
use crate::store::WebhookStore;
use skylearn_db::models::{
    NewWebhookDeliveryAttempt, NewWebhookPendingDelivery, UpdateWebhookSubscription,
    WebhookDeliveryAttempt, WebhookPendingDelivery, WebhookSubscription,
};

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<Uuid, WebhookSubscription>,
    attempts: Vec<WebhookDeliveryAttempt>,
    pending: Vec<WebhookPendingDelivery>,
}

/// Lock-guarded in-memory implementation of [`WebhookStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of logged attempts across all subscriptions. Test helper.
    pub async fn attempt_count(&self) -> usize {
        self.inner.read().await.attempts.len()
    }

    /// Number of queued (not yet claimed) retries. Test helper.
    pub async fn pending_count(&self) -> usize {
        self.inner.read().await.pending.len()
    }

    /// Snapshot of the queued retries. Test helper.
    pub async fn pending_snapshot(&self) -> Vec<WebhookPendingDelivery> {
        self.inner.read().await.pending.clone()
    }
}

#[async_trait::async_trait]
impl WebhookStore for MemoryStore {
    async fn insert_subscription(&self, sub: WebhookSubscription) -> Result<(), WebhookError> {
        self.inner.write().await.subscriptions.insert(sub.id, sub);
        Ok(())
    }

    async fn get_subscription(
        &self,
        id: Uuid,
    ) -> Result<Option<WebhookSubscription>, WebhookError> {
        Ok(self.inner.read().await.subscriptions.get(&id).cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        let inner = self.inner.read().await;
        let mut subs: Vec<_> = inner
            .subscriptions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }

    async fn count_by_owner(&self, owner_id: Uuid) -> Result<i64, WebhookError> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .count() as i64)
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        changes: UpdateWebhookSubscription,
    ) -> Result<Option<WebhookSubscription>, WebhookError> {
        let mut inner = self.inner.write().await;
        let Some(sub) = inner.subscriptions.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            sub.name = name;
        }
        if let Some(url) = changes.url {
            sub.url = url;
        }
        if let Some(events) = changes.events {
            sub.events = events;
        }
        if let Some(active) = changes.active {
            sub.active = active;
        }
        sub.updated_at = Utc::now();
        Ok(Some(sub.clone()))
    }

    async fn set_secret(&self, id: Uuid, secret_encrypted: String) -> Result<bool, WebhookError> {
        let mut inner = self.inner.write().await;
        let Some(sub) = inner.subscriptions.get_mut(&id) else {
            return Ok(false);
        };
        sub.secret_encrypted = secret_encrypted;
        sub.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<bool, WebhookError> {
        let mut inner = self.inner.write().await;
        if inner.subscriptions.remove(&id).is_none() {
            return Ok(false);
        }
        inner.attempts.retain(|a| a.subscription_id != id);
        inner.pending.retain(|p| p.subscription_id != id);
        Ok(true)
    }

    async fn find_active_by_event(
        &self,
        event: &str,
    ) -> Result<Vec<WebhookSubscription>, WebhookError> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .values()
            .filter(|s| s.active && s.events.iter().any(|e| e == event))
            .cloned()
            .collect())
    }

    async fn record_success(&self, id: Uuid) -> Result<(), WebhookError> {
        let mut inner = self.inner.write().await;
        if let Some(sub) = inner.subscriptions.get_mut(&id) {
            sub.consecutive_failures = 0;
            sub.last_success_at = Some(Utc::now());
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_failure(&self, id: Uuid) -> Result<i32, WebhookError> {
        let mut inner = self.inner.write().await;
        let sub = inner
            .subscriptions
            .get_mut(&id)
            .ok_or(WebhookError::SubscriptionNotFound)?;
        sub.consecutive_failures += 1;
        sub.last_failure_at = Some(Utc::now());
        sub.updated_at = Utc::now();
        Ok(sub.consecutive_failures)
    }

    async fn reset_failures(&self, id: Uuid) -> Result<(), WebhookError> {
        let mut inner = self.inner.write().await;
        if let Some(sub) = inner.subscriptions.get_mut(&id) {
            sub.consecutive_failures = 0;
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), WebhookError> {
        let mut inner = self.inner.write().await;
        if let Some(sub) = inner.subscriptions.get_mut(&id) {
            sub.active = false;
            sub.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_attempt(
        &self,
        attempt: NewWebhookDeliveryAttempt,
    ) -> Result<WebhookDeliveryAttempt, WebhookError> {
        let row = WebhookDeliveryAttempt {
            id: Uuid::new_v4(),
            subscription_id: attempt.subscription_id,
            event: attempt.event,
            payload: attempt.payload,
            attempt_number: attempt.attempt_number,
            response_code: attempt.response_code,
            response_body: attempt.response_body,
            outcome: attempt.outcome,
            created_at: Utc::now(),
        };
        self.inner.write().await.attempts.push(row.clone());
        Ok(row)
    }

    async fn list_attempts(
        &self,
        subscription_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDeliveryAttempt>, WebhookError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .attempts
            .iter()
            .filter(|a| a.subscription_id == subscription_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn enqueue_retry(&self, retry: NewWebhookPendingDelivery) -> Result<(), WebhookError> {
        let row = WebhookPendingDelivery {
            id: Uuid::new_v4(),
            subscription_id: retry.subscription_id,
            event: retry.event,
            data: retry.data,
            attempt_number: retry.attempt_number,
            due_at: retry.due_at,
            created_at: Utc::now(),
        };
        self.inner.write().await.pending.push(row);
        Ok(())
    }

    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        batch: i64,
    ) -> Result<Vec<WebhookPendingDelivery>, WebhookError> {
        let mut inner = self.inner.write().await;
        inner.pending.sort_by_key(|p| p.due_at);

        let mut claimed = Vec::new();
        let mut remaining = Vec::new();
        for row in inner.pending.drain(..) {
            if row.due_at <= now && (claimed.len() as i64) < batch {
                claimed.push(row);
            } else {
                remaining.push(row);
            }
        }
        inner.pending = remaining;
        Ok(claimed)
    }
}
