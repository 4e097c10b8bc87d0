//! Audit sink capability (spec.md §6 "Audit sink").

use async_trait::async_trait;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_action(&self, action_type: &str, context: serde_json::Value, outcome: &str);
}

/// Ambient default audit sink: writes through `tracing`, matching the
/// teacher's `AuditLogService` shape without requiring an external sink to
/// be wired (SPEC_FULL.md §4.4).
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_action(&self, action_type: &str, context: serde_json::Value, outcome: &str) {
        tracing::info!(action_type, outcome, %context, "audit");
    }
}
