//! Webhook delivery execution.
//!
//! Routes domain events to matching subscriptions, executes signed HTTP POST
//! attempts, logs every attempt to the append-only delivery log, updates
//! subscription health counters, and schedules bounded retries with
//! exponential backoff through the durable pending-delivery queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::audit::{AuditRecord, AuditSeverity, AuditSink, TracingAuditSink};
use crate::crypto;
use crate::error::WebhookError;
use crate::models::{DeliveryEnvelope, DeliveryOutcome, TestDeliveryOutcome, WebhookIdentity};
use crate::services::event_publisher::WebhookEvent;
use crate::store::WebhookStore;
use skylearn_db::models::{
    NewWebhookDeliveryAttempt, NewWebhookPendingDelivery, WebhookPendingDelivery,
    WebhookSubscription,
};

/// Maximum delivery attempts per event (initial attempt + 2 retries).
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Consecutive-failure threshold before a subscription is auto-disabled.
/// Cumulative across events; reset only by a successful delivery.
pub const DEFAULT_DISABLE_THRESHOLD: i32 = 10;

/// Request timeout for delivery attempts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exponential backoff schedule, indexed by the attempt that just failed:
/// 30s, 2min, 8min. Clamped at the last entry for later attempts.
pub const DEFAULT_BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(30),
    Duration::from_secs(120),
    Duration::from_secs(480),
];

/// Response bodies are truncated to this many characters before logging.
const MAX_LOGGED_BODY_CHARS: usize = 4096;

/// User-Agent header on outbound deliveries.
pub const WEBHOOK_USER_AGENT: &str = "SkyLearn-Billing-Webhook/1.0";

/// Executes webhook deliveries and schedules retries.
#[derive(Clone)]
pub struct DeliveryService {
    store: Arc<dyn WebhookStore>,
    audit: Arc<dyn AuditSink>,
    http_client: Client,
    encryption_key: Vec<u8>,
    timeout: Duration,
    max_attempts: i32,
    disable_threshold: i32,
    backoff_schedule: Vec<Duration>,
}

impl DeliveryService {
    /// Create a new delivery service with a shared HTTP client.
    ///
    /// Redirects are never followed: a redirect would let a compromised
    /// receiver re-route signed deliveries to an unintended host.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn WebhookStore>,
        encryption_key: Vec<u8>,
    ) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .user_agent(WEBHOOK_USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            store,
            audit: Arc::new(TracingAuditSink),
            http_client,
            encryption_key,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            disable_threshold: DEFAULT_DISABLE_THRESHOLD,
            backoff_schedule: DEFAULT_BACKOFF_SCHEDULE.to_vec(),
        })
    }

    /// Set the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Set the maximum delivery attempts per event.
    #[must_use]
    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the consecutive-failure threshold for auto-disable.
    #[must_use]
    pub fn with_disable_threshold(mut self, threshold: i32) -> Self {
        self.disable_threshold = threshold;
        self
    }

    /// Set the per-attempt request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the backoff schedule. The schedule is clamped at its last
    /// entry for attempts beyond its length; it must be non-empty.
    #[must_use]
    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        assert!(!schedule.is_empty(), "backoff schedule must be non-empty");
        self.backoff_schedule = schedule;
        self
    }

    /// Get the store this service writes through.
    #[must_use]
    pub fn store(&self) -> Arc<dyn WebhookStore> {
        Arc::clone(&self.store)
    }

    /// Deliver an event to all matching active subscriptions.
    ///
    /// Each subscription is delivered in its own task: a slow endpoint, a
    /// failure, or a panic in one delivery never affects another. Zero
    /// matching subscriptions is a silent no-op. Nothing is ever propagated
    /// back to the event emitter.
    pub async fn dispatch(&self, event: &WebhookEvent) {
        let subscriptions = match self.store.find_active_by_event(&event.event).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.event_id,
                    event = %event.event,
                    error = %e,
                    "Failed to query matching subscriptions"
                );
                return;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.event_id,
                event = %event.event,
                "No active subscriptions match event"
            );
            return;
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.event_id,
            event = %event.event,
            subscription_count = subscriptions.len(),
            "Delivering event to matching subscriptions"
        );

        let mut handles = Vec::with_capacity(subscriptions.len());
        for sub in subscriptions {
            let service = self.clone();
            let event_name = event.event.clone();
            let data = event.data.clone();
            handles.push(tokio::spawn(async move {
                service.execute_attempt(&sub, &event_name, &data, 1).await;
            }));
        }
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(
                    target: "webhook_delivery",
                    event_id = %event.event_id,
                    error = %e,
                    "Delivery task panicked"
                );
            }
        }
    }

    /// Execute a claimed retry from the pending-delivery queue.
    ///
    /// Deactivation does not cancel already-queued retries eagerly; this
    /// check at fire time is the cancellation mechanism. Skipped retries
    /// log nothing to the attempt log and consume no further attempts.
    pub async fn process_retry(&self, pending: &WebhookPendingDelivery) {
        let subscription = match self.store.get_subscription(pending.subscription_id).await {
            Ok(Some(sub)) if sub.active => sub,
            Ok(Some(_)) => {
                tracing::debug!(
                    target: "webhook_delivery",
                    subscription_id = %pending.subscription_id,
                    event = %pending.event,
                    attempt_number = pending.attempt_number,
                    "Skipping retry for inactive subscription"
                );
                return;
            }
            Ok(None) => {
                tracing::debug!(
                    target: "webhook_delivery",
                    subscription_id = %pending.subscription_id,
                    event = %pending.event,
                    "Dropping retry for deleted subscription"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %pending.subscription_id,
                    error = %e,
                    "Failed to load subscription for retry"
                );
                return;
            }
        };

        self.execute_attempt(&subscription, &pending.event, &pending.data, pending.attempt_number)
            .await;
    }

    /// Execute one delivery attempt: build the envelope, serialize it once,
    /// sign those exact bytes, POST, classify, log, and update health.
    pub async fn execute_attempt(
        &self,
        subscription: &WebhookSubscription,
        event: &str,
        data: &JsonValue,
        attempt_number: i32,
    ) {
        let envelope = DeliveryEnvelope {
            event: event.to_string(),
            data: data.clone(),
            timestamp: Utc::now().timestamp(),
            webhook: Some(WebhookIdentity {
                id: subscription.id,
                name: subscription.name.clone(),
            }),
        };

        // Serialization failure is an internal error, not a delivery
        // failure: it cannot succeed on retry, so it consumes no attempt
        // and logs no attempt row.
        let payload = match serde_json::to_value(&envelope) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    event = %event,
                    error = %e,
                    "Internal error: failed to serialize webhook envelope"
                );
                return;
            }
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    event = %event,
                    error = %e,
                    "Internal error: failed to serialize webhook payload"
                );
                return;
            }
        };

        let secret = match crypto::decrypt_secret(&subscription.secret_encrypted, &self.encryption_key)
        {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    error = %e,
                    "Internal error: failed to decrypt subscription secret"
                );
                return;
            }
        };

        let signature = crypto::sign_payload(&secret, &body);
        let delivery_id = Uuid::new_v4();

        let result = self
            .http_client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header("X-Event", event)
            .header("X-Signature", &signature)
            .header("X-Delivery", delivery_id.to_string())
            .timeout(self.timeout)
            .body(body)
            .send()
            .await;

        let (outcome, response_code, response_body) = match result {
            Ok(response) => {
                let status = response.status().as_u16() as i32;
                let text = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_LOGGED_BODY_CHARS)
                    .collect::<String>();

                if (200..300).contains(&status) {
                    (DeliveryOutcome::Success, status, text)
                } else {
                    (DeliveryOutcome::Failure, status, text)
                }
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("Request timeout ({}s)", self.timeout.as_secs())
                } else if e.is_connect() {
                    format!("Connection failed: {e}")
                } else {
                    format!("Request error: {e}")
                };
                (DeliveryOutcome::Failure, 0, message)
            }
        };

        if let Err(e) = self
            .store
            .insert_attempt(NewWebhookDeliveryAttempt {
                subscription_id: subscription.id,
                event: event.to_string(),
                payload,
                attempt_number,
                response_code,
                response_body: response_body.clone(),
                outcome: outcome.to_string(),
            })
            .await
        {
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                error = %e,
                "Failed to log delivery attempt"
            );
        }

        match outcome {
            DeliveryOutcome::Success => {
                self.handle_success(subscription, event, delivery_id, attempt_number, response_code)
                    .await;
            }
            DeliveryOutcome::Failure => {
                self.handle_failure(
                    subscription,
                    event,
                    data,
                    delivery_id,
                    attempt_number,
                    response_code,
                    &response_body,
                )
                .await;
            }
        }
    }

    async fn handle_success(
        &self,
        subscription: &WebhookSubscription,
        event: &str,
        delivery_id: Uuid,
        attempt_number: i32,
        response_code: i32,
    ) {
        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %delivery_id,
            subscription_id = %subscription.id,
            event = %event,
            attempt_number,
            response_code,
            "Webhook delivery succeeded"
        );

        if let Err(e) = self.store.record_success(subscription.id).await {
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                error = %e,
                "Failed to record delivery success"
            );
        }

        self.audit
            .record(AuditRecord::new(
                "delivery_succeeded",
                None,
                json!({
                    "subscription_id": subscription.id,
                    "event": event,
                    "delivery_id": delivery_id,
                    "attempt_number": attempt_number,
                    "response_code": response_code,
                }),
                AuditSeverity::Info,
            ))
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_failure(
        &self,
        subscription: &WebhookSubscription,
        event: &str,
        data: &JsonValue,
        delivery_id: Uuid,
        attempt_number: i32,
        response_code: i32,
        response_body: &str,
    ) {
        let retries_left = attempt_number < self.max_attempts;

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery_id,
            subscription_id = %subscription.id,
            event = %event,
            attempt_number,
            response_code,
            has_next_retry = retries_left,
            "Webhook delivery failed"
        );

        self.audit
            .record(AuditRecord::new(
                "delivery_failed",
                None,
                json!({
                    "subscription_id": subscription.id,
                    "event": event,
                    "delivery_id": delivery_id,
                    "attempt_number": attempt_number,
                    "response_code": response_code,
                }),
                AuditSeverity::Warning,
            ))
            .await;

        // Cumulative counter, atomic increment. Exhaustion of this event's
        // retries does not reset it; only a success does.
        match self.store.record_failure(subscription.id).await {
            Ok(failures) => {
                if failures >= self.disable_threshold {
                    self.disable_subscription(subscription, failures).await;
                }
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to increment consecutive failures"
                );
            }
        }

        if retries_left {
            let due_at = self.next_attempt_due(attempt_number);
            if let Err(e) = self
                .store
                .enqueue_retry(NewWebhookPendingDelivery {
                    subscription_id: subscription.id,
                    event: event.to_string(),
                    data: data.clone(),
                    attempt_number: attempt_number + 1,
                    due_at,
                })
                .await
            {
                tracing::error!(
                    target: "webhook_delivery",
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to schedule delivery retry"
                );
            }
        } else {
            tracing::info!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                event = %event,
                max_attempts = self.max_attempts,
                "Delivery retries exhausted"
            );
        }
    }

    async fn disable_subscription(&self, subscription: &WebhookSubscription, failures: i32) {
        tracing::warn!(
            target: "webhook_delivery",
            subscription_id = %subscription.id,
            owner_id = %subscription.owner_id,
            consecutive_failures = failures,
            threshold = self.disable_threshold,
            "Auto-disabling subscription due to consecutive failures"
        );

        if let Err(e) = self.store.deactivate(subscription.id).await {
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription.id,
                error = %e,
                "Failed to auto-disable subscription"
            );
            return;
        }

        self.audit
            .record(AuditRecord::new(
                "subscription_disabled",
                None,
                json!({
                    "subscription_id": subscription.id,
                    "consecutive_failures": failures,
                    "reason": "too_many_failures",
                }),
                AuditSeverity::Warning,
            ))
            .await;
    }

    /// When the next attempt is due after `attempt_number` just failed.
    #[must_use]
    pub fn next_attempt_due(&self, attempt_number: i32) -> DateTime<Utc> {
        Utc::now() + self.backoff_delay(attempt_number)
    }

    /// Backoff delay after `attempt_number` failed (1-based), clamped at the
    /// schedule's last entry.
    #[must_use]
    pub fn backoff_delay(&self, attempt_number: i32) -> Duration {
        let idx = (attempt_number - 1).max(0) as usize;
        self.backoff_schedule
            .get(idx)
            .copied()
            .unwrap_or_else(|| *self.backoff_schedule.last().expect("schedule is non-empty"))
    }

    /// Send a synthetic `test` envelope to an endpoint, signed with the
    /// given secret. Nothing is persisted; intended for "verify my endpoint"
    /// diagnostics before or after registration.
    pub async fn test_delivery(
        &self,
        url: &str,
        secret: &str,
    ) -> Result<TestDeliveryOutcome, WebhookError> {
        let envelope = DeliveryEnvelope {
            event: "test".to_string(),
            data: json!({ "message": "This is a test webhook" }),
            timestamp: Utc::now().timestamp(),
            webhook: None,
        };

        let body = serde_json::to_vec(&envelope)
            .map_err(|e| WebhookError::Internal(format!("Failed to serialize test payload: {e}")))?;
        let signature = crypto::sign_payload(secret, &body);

        let result = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Event", "test")
            .header("X-Signature", &signature)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16() as i32;
                let text = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(MAX_LOGGED_BODY_CHARS)
                    .collect::<String>();
                Ok(TestDeliveryOutcome {
                    success: (200..300).contains(&status),
                    response_code: status,
                    response_body: text,
                })
            }
            Err(e) => Ok(TestDeliveryOutcome {
                success: false,
                response_code: 0,
                response_body: format!("Request error: {e}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> DeliveryService {
        DeliveryService::new(Arc::new(MemoryStore::new()), vec![0x42u8; 32])
            .expect("failed to build delivery service")
    }

    #[tokio::test]
    async fn test_backoff_schedule_values() {
        let service = service();
        assert_eq!(service.backoff_delay(1), Duration::from_secs(30));
        assert_eq!(service.backoff_delay(2), Duration::from_secs(120));
        assert_eq!(service.backoff_delay(3), Duration::from_secs(480));
    }

    #[tokio::test]
    async fn test_backoff_clamps_at_last_entry() {
        let service = service();
        assert_eq!(service.backoff_delay(4), Duration::from_secs(480));
        assert_eq!(service.backoff_delay(100), Duration::from_secs(480));
    }

    #[tokio::test]
    async fn test_backoff_schedule_monotonically_increasing() {
        let service = service();
        for attempt in 2..=3 {
            assert!(service.backoff_delay(attempt) > service.backoff_delay(attempt - 1));
        }
    }

    #[tokio::test]
    async fn test_next_attempt_due_first_retry() {
        let service = service();
        let due = service.next_attempt_due(1);
        let delay = due - Utc::now();
        // ~30 seconds, small tolerance for timing
        assert!(delay.num_seconds() >= 28 && delay.num_seconds() <= 32);
    }

    #[tokio::test]
    async fn test_custom_backoff_schedule() {
        let service = service().with_backoff_schedule(vec![Duration::from_millis(5)]);
        assert_eq!(service.backoff_delay(1), Duration::from_millis(5));
        assert_eq!(service.backoff_delay(9), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_default_constants_match_policy() {
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 3);
        assert_eq!(DEFAULT_DISABLE_THRESHOLD, 10);
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(30));
        assert_eq!(DEFAULT_BACKOFF_SCHEDULE.len(), 3);
    }
}
