//! Persistence layer for the SkyLearn webhook delivery engine.
//!
//! Provides `sqlx`-based models for webhook subscriptions, delivery attempt
//! logs, and the durable pending-delivery queue, plus pool construction and
//! embedded migrations.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
