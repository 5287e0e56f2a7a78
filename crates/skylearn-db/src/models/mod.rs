//! Database models for the webhook delivery engine.

pub mod webhook_delivery_attempt;
pub mod webhook_pending_delivery;
pub mod webhook_subscription;

pub use webhook_delivery_attempt::{NewWebhookDeliveryAttempt, WebhookDeliveryAttempt};
pub use webhook_pending_delivery::{NewWebhookPendingDelivery, WebhookPendingDelivery};
pub use webhook_subscription::{UpdateWebhookSubscription, WebhookSubscription};
