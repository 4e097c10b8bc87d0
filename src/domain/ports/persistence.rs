//! Persistence store port (spec.md §4.1).
//!
//! All other components read/write Tasks, Thoughts, Correlations, and
//! scheduled/deferred records only through this trait. The concrete
//! backing store is external (see `adapters::sqlite`, `adapters::memory`).

use async_trait::async_trait;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    ActionSelectionResult, Correlation, CorrelationId, CorrelationStatus, DeferralReportContext,
    ScheduledTask, ScheduledTaskId, Task, TaskId, TaskStatus, Thought, ThoughtId, ThoughtStatus,
};

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    // -- Tasks --------------------------------------------------------

    async fn add_task(&self, task: Task) -> Result<(), PersistenceError>;
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, PersistenceError>;
    async fn task_exists(&self, id: TaskId) -> Result<bool, PersistenceError>;
    async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<(), PersistenceError>;
    async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, PersistenceError>;
    /// Ordered by priority desc, then created_at asc.
    async fn get_pending_tasks_for_activation(&self, limit: usize) -> Result<Vec<Task>, PersistenceError>;
    async fn get_recent_completed_tasks(&self, limit: usize) -> Result<Vec<Task>, PersistenceError>;
    async fn get_top_tasks(&self, limit: usize) -> Result<Vec<Task>, PersistenceError>;
    /// ACTIVE tasks with zero non-terminal thoughts.
    async fn get_tasks_needing_seed_thought(&self, limit: usize) -> Result<Vec<Task>, PersistenceError>;
    async fn count_tasks(&self, status: Option<TaskStatus>) -> Result<u64, PersistenceError>;
    /// Cascades to thoughts and per-thought side tables.
    async fn delete_tasks_by_ids(&self, ids: &[TaskId]) -> Result<(), PersistenceError>;

    // -- Thoughts -------------------------------------------------------

    async fn add_thought(&self, thought: Thought) -> Result<(), PersistenceError>;
    async fn get_thought(&self, id: ThoughtId) -> Result<Option<Thought>, PersistenceError>;
    async fn get_thoughts_by_task_id(&self, task_id: TaskId) -> Result<Vec<Thought>, PersistenceError>;
    async fn get_thoughts_by_status(&self, status: ThoughtStatus) -> Result<Vec<Thought>, PersistenceError>;
    /// Only thoughts whose source task is ACTIVE, ordered by task priority
    /// desc, then thought priority desc, then created_at asc. MUST NOT
    /// return thoughts belonging to non-ACTIVE tasks, even transiently.
    async fn get_pending_thoughts_for_active_tasks(&self, limit: usize) -> Result<Vec<Thought>, PersistenceError>;
    async fn update_thought_status(
        &self,
        id: ThoughtId,
        status: ThoughtStatus,
        final_action: Option<ActionSelectionResult>,
        round_processed: Option<u64>,
    ) -> Result<(), PersistenceError>;
    /// PENDING + PROCESSING count.
    async fn count_thoughts(&self) -> Result<u64, PersistenceError>;
    async fn delete_thoughts_by_ids(&self, ids: &[ThoughtId]) -> Result<(), PersistenceError>;
    /// PONDER bookkeeping (spec.md §4.3 Step 8): increments `ponder_count`,
    /// appends `notes`, and resets status to PENDING in one atomic update.
    async fn record_ponder(&self, id: ThoughtId, notes: Vec<String>) -> Result<(), PersistenceError>;

    // -- Correlations -----------------------------------------------------

    async fn add_correlation(&self, correlation: Correlation) -> Result<(), PersistenceError>;
    async fn update_correlation(
        &self,
        id: CorrelationId,
        response: serde_json::Value,
        status: CorrelationStatus,
    ) -> Result<(), PersistenceError>;
    async fn get_correlation(&self, id: CorrelationId) -> Result<Option<Correlation>, PersistenceError>;

    // -- Deferral report mapping -----------------------------------------

    async fn save_deferral_report_mapping(
        &self,
        message_id: String,
        task_id: TaskId,
        thought_id: ThoughtId,
        package: Option<serde_json::Value>,
    ) -> Result<(), PersistenceError>;
    async fn get_deferral_report_context(
        &self,
        message_id: &str,
    ) -> Result<Option<DeferralReportContext>, PersistenceError>;

    // -- Scheduled tasks (extension of the same store, §4.1) -------------

    async fn add_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError>;
    async fn get_scheduled_task(&self, id: ScheduledTaskId) -> Result<Option<ScheduledTask>, PersistenceError>;
    async fn get_active_scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError>;
    async fn update_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError>;
    async fn delete_scheduled_task(&self, id: ScheduledTaskId) -> Result<(), PersistenceError>;
}
