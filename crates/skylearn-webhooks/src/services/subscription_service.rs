//! Webhook subscription registry.
//!
//! Business logic for creating, listing, updating, rotating, and deleting
//! webhook subscriptions: URL validation, SSRF protection, owner lookup,
//! event-set validation, per-owner limits, and secret handling. The signing
//! secret is generated here, stored encrypted, and returned to the caller
//! exactly once.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AnyOwner, AuditRecord, AuditSeverity, AuditSink, OwnerDirectory, TracingAuditSink};
use crate::crypto;
use crate::error::WebhookError;
use crate::models::{
    CreateSubscriptionRequest, CreatedSubscription, SubscriptionResponse,
    UpdateSubscriptionRequest,
};
use crate::store::WebhookStore;
use crate::validation;
use skylearn_db::models::{UpdateWebhookSubscription, WebhookDeliveryAttempt, WebhookSubscription};

/// Default maximum subscriptions per owner.
pub const DEFAULT_MAX_SUBSCRIPTIONS: i64 = 25;

/// Registry of webhook subscriptions.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn WebhookStore>,
    owners: Arc<dyn OwnerDirectory>,
    audit: Arc<dyn AuditSink>,
    encryption_key: Vec<u8>,
    max_subscriptions: i64,
    allow_internal_hosts: bool,
}

impl SubscriptionService {
    /// Create a new registry with default collaborators (every owner
    /// accepted, audit records forwarded to `tracing`).
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, encryption_key: Vec<u8>) -> Self {
        Self {
            store,
            owners: Arc::new(AnyOwner),
            audit: Arc::new(TracingAuditSink),
            encryption_key,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            allow_internal_hosts: false,
        }
    }

    /// Set the identity store used to validate owners at registration time.
    #[must_use]
    pub fn with_owner_directory(mut self, owners: Arc<dyn OwnerDirectory>) -> Self {
        self.owners = owners;
        self
    }

    /// Set the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Set the maximum subscriptions per owner.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: i64) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Allow loopback/internal target hosts (for development/testing).
    #[must_use]
    pub fn with_allow_internal_hosts(mut self, allow: bool) -> Self {
        self.allow_internal_hosts = allow;
        self
    }

    /// Register a new webhook subscription.
    ///
    /// Generates the signing secret internally and returns it exactly once;
    /// it is stored encrypted and never appears in any later listing.
    pub async fn create(
        &self,
        owner_id: Uuid,
        request: CreateSubscriptionRequest,
    ) -> Result<CreatedSubscription, WebhookError> {
        if !self.owners.owner_exists(owner_id).await {
            return Err(WebhookError::OwnerNotFound(owner_id));
        }

        validation::validate_webhook_url(&request.url, self.allow_internal_hosts)?;
        validation::validate_event_set(&request.events)?;

        let count = self.store.count_by_owner(owner_id).await?;
        if count >= self.max_subscriptions {
            return Err(WebhookError::SubscriptionLimitExceeded {
                limit: self.max_subscriptions,
            });
        }

        let secret = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        let now = Utc::now();
        let sub = WebhookSubscription {
            id: Uuid::new_v4(),
            owner_id,
            name: request.name,
            url: request.url,
            events: request.events,
            secret_encrypted,
            active: true,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_subscription(sub.clone()).await?;

        tracing::info!(
            target: "webhook_registry",
            subscription_id = %sub.id,
            owner_id = %owner_id,
            url = %sub.url,
            events = ?sub.events,
            "Webhook subscription created"
        );

        self.audit
            .record(AuditRecord::new(
                "subscription_created",
                Some(owner_id),
                json!({
                    "subscription_id": sub.id,
                    "name": sub.name,
                    "url": sub.url,
                    "events": sub.events,
                }),
                AuditSeverity::Info,
            ))
            .await;

        Ok(CreatedSubscription {
            subscription: SubscriptionResponse::from(sub),
            secret,
        })
    }

    /// Get a single subscription.
    pub async fn get(&self, id: Uuid) -> Result<SubscriptionResponse, WebhookError> {
        let sub = self
            .store
            .get_subscription(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;
        Ok(SubscriptionResponse::from(sub))
    }

    /// List all subscriptions registered by an owner. Secrets are redacted.
    pub async fn list_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<SubscriptionResponse>, WebhookError> {
        let subs = self.store.list_by_owner(owner_id).await?;
        Ok(subs.into_iter().map(SubscriptionResponse::from).collect())
    }

    /// Update a subscription. Only name, URL, event set, and the active flag
    /// are mutable; the secret is immutable post-creation (see
    /// [`Self::rotate_secret`]).
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateSubscriptionRequest,
    ) -> Result<SubscriptionResponse, WebhookError> {
        if let Some(ref url) = request.url {
            validation::validate_webhook_url(url, self.allow_internal_hosts)?;
        }
        if let Some(ref events) = request.events {
            validation::validate_event_set(events)?;
        }

        // Re-enabling gives the endpoint a clean slate
        let re_enabling = request.active == Some(true);

        let changes = UpdateWebhookSubscription {
            name: request.name,
            url: request.url,
            events: request.events,
            active: request.active,
        };

        let mut sub = self
            .store
            .update_subscription(id, changes)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        if re_enabling && sub.consecutive_failures > 0 {
            self.store.reset_failures(id).await?;
            sub.consecutive_failures = 0;
        }

        self.audit
            .record(AuditRecord::new(
                "subscription_updated",
                Some(sub.owner_id),
                json!({ "subscription_id": id }),
                AuditSeverity::Info,
            ))
            .await;

        Ok(SubscriptionResponse::from(sub))
    }

    /// Issue a new signing secret, invalidating the old one. Returns the new
    /// plaintext secret exactly once.
    pub async fn rotate_secret(&self, id: Uuid) -> Result<String, WebhookError> {
        let sub = self
            .store
            .get_subscription(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        let secret = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        if !self.store.set_secret(id, secret_encrypted).await? {
            return Err(WebhookError::SubscriptionNotFound);
        }

        tracing::info!(
            target: "webhook_registry",
            subscription_id = %id,
            "Webhook signing secret rotated"
        );

        self.audit
            .record(AuditRecord::new(
                "secret_rotated",
                Some(sub.owner_id),
                json!({ "subscription_id": id }),
                AuditSeverity::Info,
            ))
            .await;

        Ok(secret)
    }

    /// Delete a subscription; its delivery log and pending retries cascade.
    pub async fn delete(&self, id: Uuid) -> Result<(), WebhookError> {
        let sub = self
            .store
            .get_subscription(id)
            .await?
            .ok_or(WebhookError::SubscriptionNotFound)?;

        if !self.store.delete_subscription(id).await? {
            return Err(WebhookError::SubscriptionNotFound);
        }

        tracing::info!(
            target: "webhook_registry",
            subscription_id = %id,
            owner_id = %sub.owner_id,
            "Webhook subscription deleted"
        );

        self.audit
            .record(AuditRecord::new(
                "subscription_deleted",
                Some(sub.owner_id),
                json!({ "subscription_id": id, "name": sub.name }),
                AuditSeverity::Info,
            ))
            .await;

        Ok(())
    }

    /// Per-attempt delivery log for a subscription, newest first, for
    /// owner-side debugging.
    pub async fn delivery_log(
        &self,
        id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDeliveryAttempt>, WebhookError> {
        if self.store.get_subscription(id).await?.is_none() {
            return Err(WebhookError::SubscriptionNotFound);
        }
        self.store.list_attempts(id, limit, offset).await
    }
}
