//! Audit sink abstraction.
//!
//! The executor records one event per `up()`/`down()` invocation. The sink
//! is injected as a constructor dependency so tests can substitute fakes;
//! durable audit storage lives outside this crate.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// A recorded orchestration operation.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Operation kind (e.g. "fleet_up", "fleet_down")
    pub operation: String,

    /// Target description (selected VM names, or "all")
    pub target: String,

    /// Whether the operation completed without per-VM errors
    pub success: bool,

    /// Additional details (counts, duration, error summary)
    pub details: HashMap<String, String>,
}

/// Receiver for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Audit sink that emits events through `tracing`.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            operation = %event.operation,
            target = %event.target,
            success = event.success,
            details = ?event.details,
            "audit event"
        );
    }
}

/// Audit sink that drops everything. Useful in tests.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: AuditEvent) {}
}
