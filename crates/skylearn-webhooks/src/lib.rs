//! Outbound webhook delivery engine for SkyLearn Billing.
//!
//! Registers webhook subscriptions, routes billing and enrollment events to
//! matching endpoints, signs each delivery with a per-subscription HMAC
//! secret, logs every attempt, retries failures with exponential backoff,
//! and auto-disables endpoints that fail persistently.
//!
//! # Architecture
//!
//! - [`SubscriptionService`]: the registry. Create, list, update, rotate
//!   secrets, delete; validates URLs (SSRF checks) and event sets.
//! - [`EventPublisher`] / [`WebhookEvent`]: typed broadcast bus decoupling
//!   event emitters from delivery.
//! - [`DeliveryService`]: routes events to matching active subscriptions,
//!   executes signed HTTP POSTs, logs attempts, schedules retries.
//! - [`WebhookWorker`]: background loop consuming the bus and polling the
//!   durable retry queue.
//! - [`WebhookStore`]: persistence seam with Postgres ([`PgWebhookStore`])
//!   and in-memory ([`MemoryStore`]) implementations.
//!
//! # Delivery contract
//!
//! Each delivery POSTs a JSON envelope `{event, data, timestamp, webhook}`
//! with `X-Event`, `X-Signature` (`sha256=<hmac-hex>` over the exact body
//! bytes), and `X-Delivery` headers. Any 2xx response is success; everything
//! else, including transport errors, is a retryable failure.

pub mod audit;
pub mod crypto;
pub mod error;
pub mod events;
pub mod models;
pub mod services;
pub mod store;
pub mod validation;
pub mod worker;

pub use audit::{AuditRecord, AuditSeverity, AuditSink, OwnerDirectory, TracingAuditSink};
pub use error::WebhookError;
pub use events::EventType;
pub use models::{
    CreateSubscriptionRequest, CreatedSubscription, DeliveryEnvelope, DeliveryOutcome,
    SubscriptionResponse, TestDeliveryOutcome, UpdateSubscriptionRequest, WebhookIdentity,
};
pub use services::delivery_service::DeliveryService;
pub use services::event_publisher::{EventPublisher, WebhookEvent};
pub use services::subscription_service::SubscriptionService;
pub use store::{MemoryStore, PgWebhookStore, WebhookStore};
pub use worker::{WebhookWorker, WorkerConfig};
