//! Audit sink seam.
//!
//! Subscription lifecycle changes (create/update/rotate/delete/disable) and
//! delivery outcomes are forwarded to an external audit sink supplied by the
//! host application. The default sink writes structured `tracing` records.

use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

impl AuditSeverity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Error => "error",
        }
    }
}

/// A single audit record emitted by the engine.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Always "webhook" for records originating here.
    pub event_type: &'static str,
    /// What happened, e.g. "subscription_created", "delivery_failed".
    pub action: String,
    /// The acting account, when one is known. Pipeline-driven records
    /// (delivery outcomes, auto-disable) carry no actor.
    pub actor_id: Option<Uuid>,
    /// Action-specific context.
    pub metadata: JsonValue,
    pub severity: AuditSeverity,
}

impl AuditRecord {
    /// Build a webhook audit record.
    #[must_use]
    pub fn new(action: &str, actor_id: Option<Uuid>, metadata: JsonValue, severity: AuditSeverity) -> Self {
        Self {
            event_type: "webhook",
            action: action.to_string(),
            actor_id,
            metadata,
            severity,
        }
    }
}

/// Destination for audit records.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Default sink that forwards audit records to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait::async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        match record.severity {
            AuditSeverity::Info => tracing::info!(
                target: "webhook_audit",
                action = %record.action,
                actor_id = ?record.actor_id,
                metadata = %record.metadata,
                "Audit record"
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: "webhook_audit",
                action = %record.action,
                actor_id = ?record.actor_id,
                metadata = %record.metadata,
                "Audit record"
            ),
            AuditSeverity::Error => tracing::error!(
                target: "webhook_audit",
                action = %record.action,
                actor_id = ?record.actor_id,
                metadata = %record.metadata,
                "Audit record"
            ),
        }
    }
}

/// Identity lookup for validating subscription owners at registration time.
#[async_trait::async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn owner_exists(&self, owner_id: Uuid) -> bool;
}

/// Directory that accepts every owner, for hosts that validate identity
/// upstream.
#[derive(Debug, Clone, Default)]
pub struct AnyOwner;

#[async_trait::async_trait]
impl OwnerDirectory for AnyOwner {
    async fn owner_exists(&self, _owner_id: Uuid) -> bool {
        true
    }
}
