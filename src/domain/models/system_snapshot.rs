//! System snapshot and thought context (spec.md §4.3 Step 1, §9 redesign
//! note: "typed `ThoughtContext` record with an explicit `extras` map").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{TaskContext, TaskId, TaskStatus};

/// Counts by Task status, recomputed each round for the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub paused: u64,
    pub failed: u64,
    pub deferred: u64,
    pub rejected: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Active => self.active += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Paused => self.paused += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Deferred => self.deferred += 1,
            TaskStatus::Rejected => self.rejected += 1,
        }
    }
}

/// Point-in-time aggregation of counts, recent tasks, resolved channel, and
/// other ambient facts passed into a thought's context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub task_status_counts: StatusCounts,
    pub thought_status_counts: StatusCounts,
    pub current_task_summary: Option<String>,
    pub current_thought_summary: Option<String>,
    pub recent_completed_task_ids: Vec<TaskId>,
    pub top_pending_task_ids: Vec<TaskId>,
    pub resolved_channel_id: String,
    pub detected_secret_refs: Vec<String>,
    pub user_profiles: Option<serde_json::Value>,
    pub telemetry: Option<serde_json::Value>,
    pub resources: Option<serde_json::Value>,
    pub agent_identity_summary: Option<String>,
    /// Ambient addition (SPEC_FULL.md §4.3): current round number and
    /// per-service readiness, carried in the original's snapshot builder.
    pub current_round_number: u64,
    pub service_health: HashMap<String, bool>,
}

/// Merged context built for a single thought's pipeline run: the thought's
/// own context, the system snapshot, and any GraphQL-enriched profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThoughtContext {
    pub task_context: TaskContext,
    pub system_snapshot: SystemSnapshot,
    pub identity_context: String,
    pub extras: HashMap<String, serde_json::Value>,
}

/// Resolve the channel id with the spec's strict priority order (§4.3
/// Step 1): task context -> thought context -> env default -> app-config
/// default by mode -> sentinel.
pub fn resolve_channel_id(
    task_channel: Option<&str>,
    thought_channel: Option<&str>,
    env_default: Option<&str>,
    config_default: Option<&str>,
) -> (String, &'static str) {
    if let Some(c) = task_channel.filter(|s| !s.is_empty()) {
        return (c.to_string(), "task.context.channel_id");
    }
    if let Some(c) = thought_channel.filter(|s| !s.is_empty()) {
        return (c.to_string(), "thought.context.channel_id");
    }
    if let Some(c) = env_default.filter(|s| !s.is_empty()) {
        return (c.to_string(), "environment default");
    }
    if let Some(c) = config_default.filter(|s| !s.is_empty()) {
        return (c.to_string(), "app-config default");
    }
    ("UNKNOWN".to_string(), "sentinel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_task_context_channel() {
        let (id, source) = resolve_channel_id(Some("c-task"), Some("c-thought"), Some("c-env"), Some("c-cfg"));
        assert_eq!(id, "c-task");
        assert_eq!(source, "task.context.channel_id");
    }

    #[test]
    fn falls_back_through_the_chain() {
        let (id, source) = resolve_channel_id(None, None, None, Some("c-cfg"));
        assert_eq!(id, "c-cfg");
        assert_eq!(source, "app-config default");
    }

    #[test]
    fn falls_back_to_sentinel() {
        let (id, source) = resolve_channel_id(None, None, None, None);
        assert_eq!(id, "UNKNOWN");
        assert_eq!(source, "sentinel");
    }

    #[test]
    fn empty_strings_are_skipped_not_selected() {
        let (id, source) = resolve_channel_id(Some(""), Some("c-thought"), None, None);
        assert_eq!(id, "c-thought");
        assert_eq!(source, "thought.context.channel_id");
    }
}
