//! Task scheduler (spec.md §4.5): a single cooperative loop that triggers
//! time-based Thoughts against existing Tasks, grounded in the teacher's
//! `services::task_schedule_service::TaskScheduleService` (persistence +
//! validation shape) and the original's
//! `ciris_engine/services/task_scheduler_service.py` (`_is_task_due`,
//! `_trigger_task` semantics, one-shot vs cron dueness).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::errors::{PersistenceError, SchedulerError};
use crate::domain::models::{
    thought_type, DeferralHistoryEntry, ScheduledTask, ScheduledTaskId, ScheduledTaskStatus,
    TaskContext, TaskStatus, Thought, ThoughtId,
};
use crate::domain::ports::PersistenceStore;
use crate::services::processors::shutdown::ShutdownContext;

/// Priority assigned to every scheduled-trigger thought (spec.md §4.5:
/// "priority HIGH"), matching the observer's `FilterPriority::High` tier.
const SCHEDULED_TRIGGER_PRIORITY_LABEL: &str = "HIGH";
const SCHEDULED_TRIGGER_PRIORITY: i32 = 5;

/// Validates a 5-field cron expression without scheduling anything,
/// matching `schedule_task`'s up-front rejection (spec.md §7
/// "SchedulerInvalidCron").
pub fn validate_cron(expression: &str) -> Result<(), SchedulerError> {
    cron::Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron(expression.to_string(), e.to_string()))?;
    Ok(())
}

/// Cooperative loop driving the scheduler tick (spec.md §4.5, §5 "The
/// scheduler runs as an independent cooperative loop").
pub struct TaskScheduler {
    persistence: Arc<dyn PersistenceStore>,
    check_interval: Duration,
}

impl TaskScheduler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, check_interval_seconds: u64) -> Self {
        Self {
            persistence,
            check_interval: Duration::from_secs(check_interval_seconds.max(1)),
        }
    }

    /// `schedule_task(name, goal, prompt, origin_thought_id, defer_until?, schedule_cron?)`
    /// (spec.md §4.5 "Scheduler API"). Exactly one of the two time fields
    /// must be non-null; an invalid cron expression raises before anything
    /// is persisted.
    pub async fn schedule_task(
        &self,
        name: impl Into<String>,
        goal_description: impl Into<String>,
        trigger_prompt: impl Into<String>,
        origin_thought_id: ThoughtId,
        defer_until: Option<DateTime<Utc>>,
        schedule_cron: Option<String>,
    ) -> Result<ScheduledTask, SchedulerError> {
        match (&defer_until, &schedule_cron) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => return Err(SchedulerError::AmbiguousTrigger),
        }
        if let Some(expr) = &schedule_cron {
            validate_cron(expr)?;
        }

        let task = ScheduledTask {
            task_id: ScheduledTaskId::new(),
            name: name.into(),
            goal_description: goal_description.into(),
            status: ScheduledTaskStatus::Active,
            trigger_prompt: trigger_prompt.into(),
            origin_thought_id,
            defer_until,
            schedule_cron,
            last_triggered_at: None,
            deferral_count: 0,
            deferral_history: Vec::new(),
            created_at: Utc::now(),
        };

        self.persistence
            .add_scheduled_task(task.clone())
            .await
            .map_err(|e| SchedulerError::InvalidCron(String::new(), e.to_string()))?;
        Ok(task)
    }

    /// `cancel_task(id)` (spec.md §4.5). A cancel followed by another
    /// `schedule_task` of the same logical task leaves no side effects from
    /// the cancelled one (spec.md §8 idempotence property): we delete the
    /// row outright rather than leaving a CANCELLED tombstone that could be
    /// re-triggered by a stale in-memory view.
    pub async fn cancel_task(&self, id: ScheduledTaskId) -> Result<bool, SchedulerError> {
        let Some(mut task) = self
            .persistence
            .get_scheduled_task(id)
            .await
            .map_err(|e| SchedulerError::NotFound(e.to_string()))?
        else {
            return Ok(false);
        };
        task.status = ScheduledTaskStatus::Cancelled;
        self.persistence
            .update_scheduled_task(task)
            .await
            .map_err(|e| SchedulerError::NotFound(e.to_string()))?;
        self.persistence
            .delete_scheduled_task(id)
            .await
            .map_err(|e| SchedulerError::NotFound(e.to_string()))?;
        Ok(true)
    }

    /// `defer_task(id, new_defer_until, reason)`: increments `deferral_count`
    /// and appends to `deferral_history` (spec.md §4.5).
    pub async fn defer_task(
        &self,
        id: ScheduledTaskId,
        new_defer_until: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<bool, SchedulerError> {
        let Some(mut task) = self
            .persistence
            .get_scheduled_task(id)
            .await
            .map_err(|e| SchedulerError::NotFound(e.to_string()))?
        else {
            return Ok(false);
        };
        task.deferral_history.push(DeferralHistoryEntry {
            deferred_at: Utc::now(),
            new_defer_until,
            reason: reason.into(),
        });
        task.deferral_count += 1;
        task.defer_until = Some(new_defer_until);
        self.persistence
            .update_scheduled_task(task)
            .await
            .map_err(|e| SchedulerError::NotFound(e.to_string()))?;
        Ok(true)
    }

    /// `handle_shutdown(ctx)`: persists active tasks (already durable — the
    /// scheduler has no separate in-memory copy to flush) and logs expected
    /// reactivation, matching the original's
    /// `TaskSchedulerService.handle_shutdown`.
    pub async fn handle_shutdown(&self, ctx: &ShutdownContext) -> Result<(), PersistenceError> {
        let active = self.persistence.get_active_scheduled_tasks().await?;
        tracing::info!(active_count = active.len(), reason = %ctx.reason, "scheduler: handling shutdown");
        if let Some(reactivation) = ctx.expected_reactivation {
            tracing::info!(%reactivation, "agent expected to reactivate; scheduled tasks will resume at that time");
        }
        Ok(())
    }

    /// One tick of the scheduler loop (spec.md §4.5 steps 1-4). Pulled out
    /// of `run` so tests can drive individual ticks deterministically.
    pub async fn tick(&self) -> Result<usize, PersistenceError> {
        let now = Utc::now();
        let due: Vec<ScheduledTask> = self
            .persistence
            .get_active_scheduled_tasks()
            .await?
            .into_iter()
            .filter(|t| Self::is_due(t, now))
            .collect();

        for task in &due {
            self.trigger(task, now).await?;
        }
        Ok(due.len())
    }

    /// spec.md §4.5 step 2: one-shot is due iff `defer_until <= now`; cron is
    /// due iff the expression is valid and (a) never triggered and some
    /// scheduled time <= now, or (b) the next cron time after
    /// `last_triggered_at` is <= now.
    fn is_due(task: &ScheduledTask, now: DateTime<Utc>) -> bool {
        if let Some(defer_until) = task.defer_until {
            return defer_until <= now;
        }
        let Some(expr) = &task.schedule_cron else {
            return false;
        };
        let Ok(schedule) = cron::Schedule::from_str(expr) else {
            return false;
        };
        match task.last_triggered_at {
            None => schedule.after(&(now - chrono::Duration::minutes(1))).next().map(|t| t <= now).unwrap_or(false),
            Some(last) => schedule.after(&last).next().map(|next| next <= now).unwrap_or(false),
        }
    }

    /// spec.md §4.5 step 3-4: create exactly one Thought against the
    /// scheduled task's parent Task, reactivating it if DEFERRED; update
    /// `last_triggered_at`; one-shot tasks complete, cron tasks stay ACTIVE.
    async fn trigger(&self, task: &ScheduledTask, now: DateTime<Utc>) -> Result<(), PersistenceError> {
        let Some(origin_thought) = self.persistence.get_thought(task.origin_thought_id).await? else {
            tracing::warn!(scheduled_task_id = %task.task_id, "origin thought missing; skipping trigger");
            return Ok(());
        };
        let parent_task_id = origin_thought.source_task_id;

        if let Some(parent_task) = self.persistence.get_task(parent_task_id).await? {
            if parent_task.status == TaskStatus::Deferred {
                self.persistence.update_task_status(parent_task_id, TaskStatus::Active).await?;
            }
        } else {
            tracing::warn!(scheduled_task_id = %task.task_id, "parent task missing; skipping trigger");
            return Ok(());
        }

        let mut context = TaskContext::default();
        context.extras.insert("scheduled_task_id".to_string(), serde_json::json!(task.task_id.to_string()));
        context.extras.insert("scheduled_task_name".to_string(), serde_json::json!(task.name));
        context.extras.insert("goal_description".to_string(), serde_json::json!(task.goal_description));
        context.extras.insert("trigger_type".to_string(), serde_json::json!("scheduled"));
        context.extras.insert("priority".to_string(), serde_json::json!(SCHEDULED_TRIGGER_PRIORITY_LABEL));

        let thought = Thought::new_seed(parent_task_id, task.trigger_prompt.clone(), context)
            .with_thought_type(thought_type::SCHEDULED_TASK_TRIGGER)
            .with_priority(SCHEDULED_TRIGGER_PRIORITY);
        self.persistence.add_thought(thought).await?;

        let mut updated = task.clone();
        updated.last_triggered_at = Some(now);
        if updated.is_one_shot() {
            updated.status = ScheduledTaskStatus::Complete;
        } else {
            updated.status = ScheduledTaskStatus::Active;
        }
        self.persistence.update_scheduled_task(updated).await?;
        Ok(())
    }

    /// Runs the cooperative loop until `stop` fires, sleeping
    /// `check_interval_seconds` between ticks (spec.md §5).
    pub async fn run(&self, mut stop: tokio::sync::watch::Receiver<bool>) -> Result<(), PersistenceError> {
        loop {
            if *stop.borrow() {
                return Ok(());
            }
            match self.tick().await {
                Ok(triggered) if triggered > 0 => tracing::info!(triggered, "scheduler tick fired due tasks"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "scheduler tick failed; will retry next interval"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {}
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::models::{Task, TaskStatus};

    async fn seed_parent_and_origin(store: &InMemoryStore) -> (crate::domain::models::TaskId, ThoughtId) {
        let mut parent = Task::new("parent", 0);
        parent.status = TaskStatus::Deferred;
        store.add_task(parent.clone()).await.unwrap();
        let origin = Thought::new_seed(parent.id, "origin", TaskContext::default());
        store.add_thought(origin.clone()).await.unwrap();
        (parent.id, origin.id)
    }

    #[tokio::test]
    async fn one_shot_schedule_requires_defer_until_only() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = TaskScheduler::new(store.clone(), 60);
        let (_, origin) = seed_parent_and_origin(&store).await;
        let err = scheduler
            .schedule_task("s", "goal", "prompt", origin, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::AmbiguousTrigger));
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = TaskScheduler::new(store.clone(), 60);
        let (_, origin) = seed_parent_and_origin(&store).await;
        let err = scheduler
            .schedule_task("s", "goal", "prompt", origin, None, Some("not a cron".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron(..)));
    }

    #[tokio::test]
    async fn one_shot_tick_reactivates_parent_and_completes_once() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = TaskScheduler::new(store.clone(), 60);
        let (parent_id, origin) = seed_parent_and_origin(&store).await;

        let due_at = Utc::now() - chrono::Duration::seconds(5);
        scheduler
            .schedule_task("s", "goal", "do the thing", origin, Some(due_at), None)
            .await
            .unwrap();

        let triggered = scheduler.tick().await.unwrap();
        assert_eq!(triggered, 1);

        let parent = store.get_task(parent_id).await.unwrap().unwrap();
        assert_eq!(parent.status, TaskStatus::Active);

        let thoughts = store.get_thoughts_by_task_id(parent_id).await.unwrap();
        let trigger = thoughts
            .iter()
            .find(|t| t.thought_type == thought_type::SCHEDULED_TASK_TRIGGER)
            .expect("scheduled trigger thought");
        assert_eq!(trigger.priority, SCHEDULED_TRIGGER_PRIORITY);

        // Second tick: task already COMPLETE, must not trigger again.
        let triggered_again = scheduler.tick().await.unwrap();
        assert_eq!(triggered_again, 0);
    }

    #[tokio::test]
    async fn cancel_then_reschedule_leaves_no_trace_of_the_cancelled_task() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = TaskScheduler::new(store.clone(), 60);
        let (_, origin) = seed_parent_and_origin(&store).await;

        let task = scheduler
            .schedule_task("s", "goal", "prompt", origin, Some(Utc::now() + chrono::Duration::hours(1)), None)
            .await
            .unwrap();
        assert!(scheduler.cancel_task(task.task_id).await.unwrap());
        assert!(store.get_scheduled_task(task.task_id).await.unwrap().is_none());

        let active = store.get_active_scheduled_tasks().await.unwrap();
        assert!(active.is_empty());
    }
}
