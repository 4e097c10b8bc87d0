//! In-memory `PersistenceStore`, used by unit/integration tests and as a
//! reference implementation of the persistence contract (spec.md §4.1).
//! Mirrors the teacher's "null object" test-double idiom
//! (`domain/ports/null_embedding.rs`, `null_memory.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    ActionSelectionResult, Correlation, CorrelationId, CorrelationStatus, DeferralReportContext,
    ScheduledTask, ScheduledTaskId, Task, TaskId, TaskStatus, Thought, ThoughtId, ThoughtStatus,
};
use crate::domain::ports::PersistenceStore;

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Task>,
    thoughts: HashMap<ThoughtId, Thought>,
    correlations: HashMap<CorrelationId, Correlation>,
    deferral_reports: HashMap<String, DeferralReportContext>,
    scheduled_tasks: HashMap<ScheduledTaskId, ScheduledTask>,
}

/// An in-memory `PersistenceStore`. Cheaply cloneable (`Arc` inside);
/// state is shared across clones.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn add_task(&self, task: Task) -> Result<(), PersistenceError> {
        self.inner.write().await.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, PersistenceError> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn task_exists(&self, id: TaskId) -> Result<bool, PersistenceError> {
        Ok(self.inner.read().await.tasks.contains_key(&id))
    }

    async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<(), PersistenceError> {
        let mut guard = self.inner.write().await;
        if let Some(task) = guard.tasks.get_mut(&id) {
            task.status = status;
            task.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, PersistenceError> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn get_pending_tasks_for_activation(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let guard = self.inner.read().await;
        let mut pending: Vec<Task> = guard
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_recent_completed_tasks(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let guard = self.inner.read().await;
        let mut completed: Vec<Task> = guard
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        completed.truncate(limit);
        Ok(completed)
    }

    async fn get_top_tasks(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let guard = self.inner.read().await;
        let mut tasks: Vec<Task> = guard.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn get_tasks_needing_seed_thought(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let guard = self.inner.read().await;
        let mut out = Vec::new();
        for task in guard.tasks.values() {
            if task.status != TaskStatus::Active {
                continue;
            }
            let has_non_terminal = guard
                .thoughts
                .values()
                .any(|th| th.source_task_id == task.id && !th.status.is_terminal());
            if !has_non_terminal {
                out.push(task.clone());
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn count_tasks(&self, status: Option<TaskStatus>) -> Result<u64, PersistenceError> {
        let guard = self.inner.read().await;
        Ok(match status {
            Some(s) => guard.tasks.values().filter(|t| t.status == s).count() as u64,
            None => guard.tasks.len() as u64,
        })
    }

    async fn delete_tasks_by_ids(&self, ids: &[TaskId]) -> Result<(), PersistenceError> {
        let mut guard = self.inner.write().await;
        for id in ids {
            guard.tasks.remove(id);
            let dead: Vec<ThoughtId> = guard
                .thoughts
                .values()
                .filter(|th| th.source_task_id == *id)
                .map(|th| th.id)
                .collect();
            for th_id in dead {
                guard.thoughts.remove(&th_id);
            }
        }
        Ok(())
    }

    async fn add_thought(&self, thought: Thought) -> Result<(), PersistenceError> {
        self.inner.write().await.thoughts.insert(thought.id, thought);
        Ok(())
    }

    async fn get_thought(&self, id: ThoughtId) -> Result<Option<Thought>, PersistenceError> {
        Ok(self.inner.read().await.thoughts.get(&id).cloned())
    }

    async fn get_thoughts_by_task_id(&self, task_id: TaskId) -> Result<Vec<Thought>, PersistenceError> {
        Ok(self
            .inner
            .read()
            .await
            .thoughts
            .values()
            .filter(|t| t.source_task_id == task_id)
            .cloned()
            .collect())
    }

    async fn get_thoughts_by_status(&self, status: ThoughtStatus) -> Result<Vec<Thought>, PersistenceError> {
        Ok(self
            .inner
            .read()
            .await
            .thoughts
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn get_pending_thoughts_for_active_tasks(&self, limit: usize) -> Result<Vec<Thought>, PersistenceError> {
        let guard = self.inner.read().await;
        let mut out: Vec<(i32, Thought)> = guard
            .thoughts
            .values()
            .filter(|th| th.status == ThoughtStatus::Pending)
            .filter_map(|th| {
                guard
                    .tasks
                    .get(&th.source_task_id)
                    .filter(|t| t.status == TaskStatus::Active)
                    .map(|t| (t.priority, th.clone()))
            })
            .collect();
        out.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.priority.cmp(&a.1.priority))
                .then(a.1.created_at.cmp(&b.1.created_at))
        });
        out.truncate(limit);
        Ok(out.into_iter().map(|(_, th)| th).collect())
    }

    async fn update_thought_status(
        &self,
        id: ThoughtId,
        status: ThoughtStatus,
        final_action: Option<ActionSelectionResult>,
        round_processed: Option<u64>,
    ) -> Result<(), PersistenceError> {
        let mut guard = self.inner.write().await;
        if let Some(th) = guard.thoughts.get_mut(&id) {
            th.status = status;
            if final_action.is_some() {
                th.final_action = final_action;
            }
            if round_processed.is_some() {
                th.round_processed = round_processed;
            }
            th.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn record_ponder(&self, id: ThoughtId, notes: Vec<String>) -> Result<(), PersistenceError> {
        let mut guard = self.inner.write().await;
        if let Some(th) = guard.thoughts.get_mut(&id) {
            th.requeue_after_ponder(notes);
        }
        Ok(())
    }

    async fn count_thoughts(&self) -> Result<u64, PersistenceError> {
        Ok(self
            .inner
            .read()
            .await
            .thoughts
            .values()
            .filter(|t| matches!(t.status, ThoughtStatus::Pending | ThoughtStatus::Processing))
            .count() as u64)
    }

    async fn delete_thoughts_by_ids(&self, ids: &[ThoughtId]) -> Result<(), PersistenceError> {
        let mut guard = self.inner.write().await;
        for id in ids {
            guard.thoughts.remove(id);
        }
        Ok(())
    }

    async fn add_correlation(&self, correlation: Correlation) -> Result<(), PersistenceError> {
        self.inner
            .write()
            .await
            .correlations
            .insert(correlation.correlation_id, correlation);
        Ok(())
    }

    async fn update_correlation(
        &self,
        id: CorrelationId,
        response: serde_json::Value,
        status: CorrelationStatus,
    ) -> Result<(), PersistenceError> {
        let mut guard = self.inner.write().await;
        if let Some(c) = guard.correlations.get_mut(&id) {
            c.response_data = Some(response);
            c.status = status;
            c.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn get_correlation(&self, id: CorrelationId) -> Result<Option<Correlation>, PersistenceError> {
        Ok(self.inner.read().await.correlations.get(&id).cloned())
    }

    async fn save_deferral_report_mapping(
        &self,
        message_id: String,
        task_id: TaskId,
        thought_id: ThoughtId,
        package: Option<serde_json::Value>,
    ) -> Result<(), PersistenceError> {
        self.inner.write().await.deferral_reports.insert(
            message_id.clone(),
            DeferralReportContext {
                message_id,
                task_id,
                thought_id,
                package,
                created_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_deferral_report_context(
        &self,
        message_id: &str,
    ) -> Result<Option<DeferralReportContext>, PersistenceError> {
        Ok(self.inner.read().await.deferral_reports.get(message_id).cloned())
    }

    async fn add_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError> {
        self.inner.write().await.scheduled_tasks.insert(task.task_id, task);
        Ok(())
    }

    async fn get_scheduled_task(&self, id: ScheduledTaskId) -> Result<Option<ScheduledTask>, PersistenceError> {
        Ok(self.inner.read().await.scheduled_tasks.get(&id).cloned())
    }

    async fn get_active_scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError> {
        use crate::domain::models::ScheduledTaskStatus;
        Ok(self
            .inner
            .read()
            .await
            .scheduled_tasks
            .values()
            .filter(|t| t.status == ScheduledTaskStatus::Active || t.status == ScheduledTaskStatus::Pending)
            .cloned()
            .collect())
    }

    async fn update_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError> {
        self.inner.write().await.scheduled_tasks.insert(task.task_id, task);
        Ok(())
    }

    async fn delete_scheduled_task(&self, id: ScheduledTaskId) -> Result<(), PersistenceError> {
        self.inner.write().await.scheduled_tasks.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskContext, Thought};

    #[tokio::test]
    async fn pending_thoughts_excludes_non_active_tasks() {
        let store = InMemoryStore::new();
        let mut active_task = Task::new("active", 5);
        active_task.status = TaskStatus::Active;
        let paused_task = Task::new("paused", 9).with_status(TaskStatus::Paused);

        let th_active = Thought::new_seed(active_task.id, "a", TaskContext::default());
        let th_paused = Thought::new_seed(paused_task.id, "b", TaskContext::default());

        store.add_task(active_task.clone()).await.unwrap();
        store.add_task(paused_task.clone()).await.unwrap();
        store.add_thought(th_active.clone()).await.unwrap();
        store.add_thought(th_paused).await.unwrap();

        let pending = store.get_pending_thoughts_for_active_tasks(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, th_active.id);
    }

    #[tokio::test]
    async fn ordering_by_task_priority_desc_then_created_at_asc() {
        let store = InMemoryStore::new();
        let mut low = Task::new("low", 1);
        low.status = TaskStatus::Active;
        let mut high = Task::new("high", 9);
        high.status = TaskStatus::Active;

        store.add_task(low.clone()).await.unwrap();
        store.add_task(high.clone()).await.unwrap();
        store.add_thought(Thought::new_seed(low.id, "l", TaskContext::default())).await.unwrap();
        store.add_thought(Thought::new_seed(high.id, "h", TaskContext::default())).await.unwrap();

        let pending = store.get_pending_thoughts_for_active_tasks(10).await.unwrap();
        assert_eq!(pending[0].source_task_id, high.id);
    }

    #[tokio::test]
    async fn ordering_by_thought_priority_desc_within_same_task_priority() {
        let store = InMemoryStore::new();
        let mut task = Task::new("t", 5);
        task.status = TaskStatus::Active;
        store.add_task(task.clone()).await.unwrap();

        let low = Thought::new_seed(task.id, "low", TaskContext::default()).with_priority(0);
        let high = Thought::new_seed(task.id, "high", TaskContext::default()).with_priority(10);
        store.add_thought(low.clone()).await.unwrap();
        store.add_thought(high.clone()).await.unwrap();

        let pending = store.get_pending_thoughts_for_active_tasks(10).await.unwrap();
        assert_eq!(pending[0].id, high.id);
        assert_eq!(pending[1].id, low.id);
    }

    #[tokio::test]
    async fn delete_tasks_cascades_to_thoughts() {
        let store = InMemoryStore::new();
        let task = Task::new("t", 0);
        let thought = Thought::new_seed(task.id, "c", TaskContext::default());
        store.add_task(task.clone()).await.unwrap();
        store.add_thought(thought.clone()).await.unwrap();

        store.delete_tasks_by_ids(&[task.id]).await.unwrap();

        assert!(store.get_task(task.id).await.unwrap().is_none());
        assert!(store.get_thought(thought.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deferral_report_round_trips() {
        let store = InMemoryStore::new();
        let task_id = TaskId::new();
        let thought_id = ThoughtId::new();
        store
            .save_deferral_report_mapping("msg-1".into(), task_id, thought_id, None)
            .await
            .unwrap();

        let ctx = store.get_deferral_report_context("msg-1").await.unwrap().unwrap();
        assert_eq!(ctx.task_id, task_id);
        assert_eq!(ctx.thought_id, thought_id);
    }
}
