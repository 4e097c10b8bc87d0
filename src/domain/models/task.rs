//! Task domain model (spec.md §3 "Task").
//!
//! A Task is a unit of intent with a lifecycle. Thoughts are the unit of
//! reasoning attached to exactly one Task (see `thought.rs`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Status of a Task.
///
/// Transitions are monotonic within a run: PENDING -> ACTIVE ->
/// {COMPLETED|FAILED|DEFERRED|REJECTED}; PAUSED may return to ACTIVE; a
/// DEFERRED task may be re-activated by the scheduler when its trigger
/// fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Paused,
    Failed,
    Deferred,
    Rejected,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
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
            "ACTIVE" => Some(Self::Active),
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

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Valid transitions from this status, per spec.md §3's invariant.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Active, Self::Rejected],
            Self::Active => &[
                Self::Completed,
                Self::Failed,
                Self::Deferred,
                Self::Rejected,
                Self::Paused,
            ],
            Self::Paused => &[Self::Active],
            Self::Deferred => &[Self::Active],
            Self::Completed | Self::Failed | Self::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Structured context carried by a Task: channel/author/origin fields plus
/// an open bag for forward compatibility (§9 redesign note: "typed record
/// with an explicit extras map").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub author_name: Option<String>,
    pub author_id: Option<String>,
    pub channel_id: Option<String>,
    pub origin_service: Option<String>,
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
}

/// A discrete unit of intent with a lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub priority: i32,
    pub parent_task_id: Option<TaskId>,
    pub context: TaskContext,
    pub outcome: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(description: impl Into<String>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            description: description.into(),
            priority,
            parent_task_id: None,
            context: TaskContext::default(),
            outcome: None,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_task_id: TaskId) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "cannot transition task {} from {} to {}",
                self.id,
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending() {
        let t = Task::new("greet user", 5);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.parent_task_id.is_none());
    }

    #[test]
    fn pending_to_active_to_completed() {
        let mut t = Task::new("greet user", 5);
        t.transition_to(TaskStatus::Active).unwrap();
        assert_eq!(t.status, TaskStatus::Active);
        t.transition_to(TaskStatus::Completed).unwrap();
        assert!(t.is_terminal());
    }

    #[test]
    fn paused_returns_to_active() {
        let mut t = Task::new("x", 0);
        t.transition_to(TaskStatus::Active).unwrap();
        t.transition_to(TaskStatus::Paused).unwrap();
        assert!(t.transition_to(TaskStatus::Active).is_ok());
    }

    #[test]
    fn deferred_task_reactivates() {
        let mut t = Task::new("x", 0);
        t.transition_to(TaskStatus::Active).unwrap();
        t.transition_to(TaskStatus::Deferred).unwrap();
        assert!(t.transition_to(TaskStatus::Active).is_ok());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut t = Task::new("x", 0);
        t.transition_to(TaskStatus::Active).unwrap();
        t.transition_to(TaskStatus::Completed).unwrap();
        assert!(t.transition_to(TaskStatus::Active).is_err());
    }

    #[test]
    fn pending_cannot_skip_to_completed() {
        let mut t = Task::new("x", 0);
        assert!(t.transition_to(TaskStatus::Completed).is_err());
    }

    #[test]
    fn status_str_round_trip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Completed,
            TaskStatus::Paused,
            TaskStatus::Failed,
            TaskStatus::Deferred,
            TaskStatus::Rejected,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
    }
}
