//! ScheduledTask domain model (spec.md §3 "ScheduledTask").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScheduledTaskId, ThoughtId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduledTaskStatus {
    Pending,
    Active,
    Complete,
    Cancelled,
}

impl ScheduledTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Complete => "COMPLETE",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// A single entry in a scheduled task's deferral history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferralHistoryEntry {
    pub deferred_at: DateTime<Utc>,
    pub new_defer_until: DateTime<Utc>,
    pub reason: String,
}

/// A persisted intent to trigger a Thought in the future, one-shot
/// (`defer_until`) or recurring (`schedule_cron`) — exactly one is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: ScheduledTaskId,
    pub name: String,
    pub goal_description: String,
    pub status: ScheduledTaskStatus,
    pub trigger_prompt: String,
    pub origin_thought_id: ThoughtId,
    pub defer_until: Option<DateTime<Utc>>,
    pub schedule_cron: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub deferral_count: u32,
    pub deferral_history: Vec<DeferralHistoryEntry>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn is_one_shot(&self) -> bool {
        self.defer_until.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        self.schedule_cron.is_some()
    }
}
