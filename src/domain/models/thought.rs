//! Thought domain model (spec.md §3 "Thought").
//!
//! A Thought is a unit of reasoning attached to exactly one Task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActionSelectionResult, TaskContext, TaskId, ThoughtId};

/// Status of a Thought. Once terminal the status does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThoughtStatus {
    Pending,
    Processing,
    Completed,
    Paused,
    Failed,
    Deferred,
    Rejected,
}

impl ThoughtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Paused => "PAUSED",
            Self::Failed => "FAILED",
            Self::Deferred => "DEFERRED",
            Self::Rejected => "REJECTED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "PAUSED" => Some(Self::Paused),
            "FAILED" => Some(Self::Failed),
            "DEFERRED" => Some(Self::Deferred),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deferred | Self::Rejected)
    }
}

/// Well-known thought types. Free-form string in the wire model, but these
/// constants cover every value the spec names.
pub mod thought_type {
    pub const SEED: &str = "seed";
    pub const FOLLOW_UP: &str = "follow_up";
    pub const MEMORY_META: &str = "memory_meta";
    pub const STARTUP_META: &str = "startup_meta";
    pub const CORRECTION: &str = "correction";
    pub const OBSERVATION: &str = "observation";
    pub const ACTIVE_OBSERVATION_RESULT: &str = "active_observation_result";
    pub const JOB: &str = "job";
    pub const STANDARD: &str = "standard";
    pub const SCHEDULED_TASK_TRIGGER: &str = "SCHEDULED_TASK_TRIGGER";
}

/// A unit of reasoning attached to exactly one Task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: ThoughtId,
    pub source_task_id: TaskId,
    pub parent_thought_id: Option<ThoughtId>,
    pub thought_type: String,
    pub content: String,
    pub context: TaskContext,
    /// Second-tier ordering key after task priority (spec.md §4.1
    /// "task priority desc then thought priority desc then created_at
    /// asc"). Seed thoughts inherit 0; follow-ups inherit the parent's
    /// priority, later adjusted by handlers via `with_priority`.
    pub priority: i32,
    pub round_number: u64,
    pub ponder_count: u32,
    pub ponder_notes: Option<Vec<String>>,
    pub final_action: Option<ActionSelectionResult>,
    pub status: ThoughtStatus,
    pub round_processed: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thought {
    pub fn new_seed(source_task_id: TaskId, content: impl Into<String>, context: TaskContext) -> Self {
        let now = Utc::now();
        Self {
            id: ThoughtId::new(),
            source_task_id,
            parent_thought_id: None,
            thought_type: thought_type::SEED.to_string(),
            content: content.into(),
            context,
            priority: 0,
            round_number: 0,
            ponder_count: 0,
            ponder_notes: None,
            final_action: None,
            status: ThoughtStatus::Pending,
            round_processed: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a follow-up thought from a completed parent thought.
    ///
    /// Follow-ups form a strict tree rooted at a seed thought; this
    /// constructor always sets `parent_thought_id`, so a cycle can only be
    /// introduced by a caller explicitly rewriting `parent_thought_id`
    /// afterward. `TaskThoughtGraph::would_cycle` (processors/round.rs)
    /// guards against that.
    pub fn new_follow_up(parent: &Thought, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ThoughtId::new(),
            source_task_id: parent.source_task_id,
            parent_thought_id: Some(parent.id),
            thought_type: thought_type::FOLLOW_UP.to_string(),
            content: content.into(),
            context: parent.context.clone(),
            priority: parent.priority,
            round_number: parent.round_number,
            ponder_count: 0,
            ponder_notes: None,
            final_action: None,
            status: ThoughtStatus::Pending,
            round_processed: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_thought_type(mut self, thought_type: impl Into<String>) -> Self {
        self.thought_type = thought_type.into();
        self
    }

    /// Sets the numeric ordering priority directly (scheduler triggers,
    /// priority observations).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_priority_context(mut self, priority: &'static str) -> Self {
        self.context
            .extras
            .insert("priority".to_string(), serde_json::json!(priority));
        self
    }

    pub fn mark_processing(&mut self, round_number: u64) {
        self.status = ThoughtStatus::Processing;
        self.round_processed = Some(round_number);
        self.updated_at = Utc::now();
    }

    /// Re-queue as PENDING after a PONDER, incrementing `ponder_count` and
    /// recording the ponder notes/questions.
    pub fn requeue_after_ponder(&mut self, notes: Vec<String>) {
        self.ponder_count += 1;
        self.ponder_notes.get_or_insert_with(Vec::new).extend(notes);
        self.status = ThoughtStatus::Pending;
        self.updated_at = Utc::now();
    }

    pub fn finalize(&mut self, status: ThoughtStatus, final_action: ActionSelectionResult) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.final_action = Some(final_action);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActionParameters, SelectedAction};

    fn dummy_action() -> ActionSelectionResult {
        ActionSelectionResult {
            selected_action: SelectedAction::TaskComplete,
            action_parameters: ActionParameters::TaskComplete,
            rationale: "done".into(),
            confidence: None,
            raw_llm_response: None,
        }
    }

    #[test]
    fn seed_thought_has_no_parent() {
        let t = Thought::new_seed(TaskId::new(), "hello", TaskContext::default());
        assert!(t.parent_thought_id.is_none());
        assert_eq!(t.thought_type, thought_type::SEED);
        assert_eq!(t.status, ThoughtStatus::Pending);
    }

    #[test]
    fn follow_up_points_at_parent() {
        let seed = Thought::new_seed(TaskId::new(), "hello", TaskContext::default());
        let follow_up = Thought::new_follow_up(&seed, "hi there");
        assert_eq!(follow_up.parent_thought_id, Some(seed.id));
        assert_eq!(follow_up.source_task_id, seed.source_task_id);
    }

    #[test]
    fn ponder_increments_count_and_resets_status() {
        let mut t = Thought::new_seed(TaskId::new(), "hello", TaskContext::default());
        t.mark_processing(1);
        t.requeue_after_ponder(vec!["why?".into()]);
        assert_eq!(t.ponder_count, 1);
        assert_eq!(t.status, ThoughtStatus::Pending);
        assert_eq!(t.ponder_notes.unwrap(), vec!["why?".to_string()]);
    }

    #[test]
    fn finalize_sets_terminal_status_and_final_action() {
        let mut t = Thought::new_seed(TaskId::new(), "hello", TaskContext::default());
        t.finalize(ThoughtStatus::Completed, dummy_action());
        assert!(t.status.is_terminal());
        assert!(t.final_action.is_some());
    }
}
