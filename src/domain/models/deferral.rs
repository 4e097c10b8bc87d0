//! Deferral report mapping (spec.md §4.1 "save_deferral_report_mapping",
//! §6 "Deferral report format").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, ThoughtId};

/// Maps an outbound deferral-notification message id back to the
/// `(task_id, thought_id)` it reports on, so a later WA correction can be
/// routed back to the right thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferralReportContext {
    pub message_id: String,
    pub task_id: TaskId,
    pub thought_id: ThoughtId,
    pub package: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// The structured content sent to a human/WA channel on DEFER
/// (spec.md §6 "Deferral report format").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferralReport {
    pub task_id: TaskId,
    pub thought_id: ThoughtId,
    pub reason: String,
    pub context_excerpt: String,
    pub package: serde_json::Value,
}

impl DeferralReport {
    /// Render the block exactly in the format a human reader expects
    /// (spec.md §6): Task ID, Deferred Thought ID, Reason, excerpt, package.
    pub fn render(&self) -> String {
        format!(
            "Action Deferred:\nTask ID: {}\nDeferred Thought ID: {}\nReason: {}\nContext: {}\nPackage: {}",
            self.task_id,
            self.thought_id,
            self.reason,
            self.context_excerpt,
            serde_json::to_string(&self.package).unwrap_or_default()
        )
    }
}
