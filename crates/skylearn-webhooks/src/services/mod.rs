//! Webhook engine services.

pub mod delivery_service;
pub mod event_publisher;
pub mod subscription_service;

pub use delivery_service::DeliveryService;
pub use event_publisher::{EventPublisher, WebhookEvent};
pub use subscription_service::SubscriptionService;
