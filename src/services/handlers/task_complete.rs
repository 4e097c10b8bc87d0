use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{ActionSelectionResult, SelectedAction, Thought, ThoughtStatus};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};

/// Terminal: no follow-up (spec.md §4.4 "TASK_COMPLETE and REJECT are
/// terminal").
pub struct TaskCompleteHandler {
    persistence: Arc<dyn PersistenceStore>,
}

impl TaskCompleteHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl ActionHandler for TaskCompleteHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::TaskComplete
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        _thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        self.persistence
            .update_thought_status(ctx.thought_id, ThoughtStatus::Completed, Some(result.clone()), Some(ctx.round_number))
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;
        Ok(HandlerOutcome { follow_up: None })
    }
}
