//! Work processor (spec.md §4.2 "Work processor"): the steady-state round
//! loop — activate, seed, queue, dispatch, complete.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{thought_type, AgentState, Task, TaskContext, Thought, ThoughtStatus};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::ActionDispatcher;
use crate::services::pipeline::ThoughtProcessor;
use crate::services::processors::round;
use crate::services::processors::runtime::{Processor, RoundOutcome};

/// Well-known name of the keep-alive task the work processor seeds when a
/// round finds the queue entirely empty (spec.md §4.2).
const MONITOR_TASK_DESCRIPTION: &str = "monitor-job";

pub struct WorkProcessor {
    persistence: Arc<dyn PersistenceStore>,
    pipeline: Arc<ThoughtProcessor>,
    dispatcher: Arc<ActionDispatcher>,
    max_active_tasks: usize,
    max_active_thoughts: usize,
}

impl WorkProcessor {
    pub fn new(
        persistence: Arc<dyn PersistenceStore>,
        pipeline: Arc<ThoughtProcessor>,
        dispatcher: Arc<ActionDispatcher>,
        max_active_tasks: usize,
        max_active_thoughts: usize,
    ) -> Self {
        Self {
            persistence,
            pipeline,
            dispatcher,
            max_active_tasks,
            max_active_thoughts,
        }
    }

    async fn keep_pipeline_warm(&self) -> Result<(), PersistenceError> {
        let monitor_task = match self
            .persistence
            .get_tasks_by_status(crate::domain::models::TaskStatus::Active)
            .await?
            .into_iter()
            .find(|t| t.description == MONITOR_TASK_DESCRIPTION)
        {
            Some(t) => t,
            None => {
                let mut task = Task::new(MONITOR_TASK_DESCRIPTION, 0);
                task.status = crate::domain::models::TaskStatus::Active;
                self.persistence.add_task(task.clone()).await?;
                task
            }
        };

        let open = self
            .persistence
            .get_thoughts_by_task_id(monitor_task.id)
            .await?
            .into_iter()
            .any(|t| matches!(t.status, ThoughtStatus::Pending | ThoughtStatus::Processing));
        if open {
            return Ok(());
        }

        let job = Thought::new_seed(monitor_task.id, "keep-alive", TaskContext::default())
            .with_thought_type(thought_type::JOB);
        self.persistence.add_thought(job).await
    }
}

#[async_trait]
impl Processor for WorkProcessor {
    fn supported_states(&self) -> &'static [AgentState] {
        &[AgentState::Work]
    }

    async fn run_round(&self, round_number: u64) -> Result<RoundOutcome, PersistenceError> {
        round::activate_and_seed(self.persistence.as_ref(), self.max_active_tasks).await?;

        let queue = round::fill_queue(self.persistence.as_ref(), self.max_active_thoughts).await?;
        if queue.is_empty() {
            self.keep_pipeline_warm().await?;
            return Ok(RoundOutcome::stay());
        }

        round::run_queue(&self.persistence, &self.pipeline, &self.dispatcher, queue, round_number).await?;
        Ok(RoundOutcome::stay())
    }
}
