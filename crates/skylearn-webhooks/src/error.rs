//! Error types for the webhook engine.

/// Webhook engine error variants.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("SSRF protection: {0}")]
    SsrfDetected(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Subscription must listen for at least one event")]
    NoEventTypes,

    #[error("Owner not found: {0}")]
    OwnerNotFound(uuid::Uuid),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Subscription limit ({limit}) reached for owner")]
    SubscriptionLimitExceeded { limit: i64 },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
