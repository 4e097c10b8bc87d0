//! Correlation domain model (spec.md §3 "Correlation").
//!
//! An auditable envelope around a side-effect invocation, used for
//! idempotency, tracing, and audit. Not consumed by the pipeline itself;
//! written by handlers and the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CorrelationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CorrelationStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    Llm,
    Memory,
    Communication,
    Tool,
    Secrets,
    Audit,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub correlation_id: CorrelationId,
    pub service_type: ServiceType,
    pub handler_name: String,
    pub action_type: String,
    pub request_data: serde_json::Value,
    pub response_data: Option<serde_json::Value>,
    pub status: CorrelationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Correlation {
    pub fn new(
        service_type: ServiceType,
        handler_name: impl Into<String>,
        action_type: impl Into<String>,
        request_data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            correlation_id: CorrelationId::new(),
            service_type,
            handler_name: handler_name.into(),
            action_type: action_type.into(),
            request_data,
            response_data: None,
            status: CorrelationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
