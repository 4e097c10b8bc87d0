use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{ActionParameters, ActionSelectionResult, SelectedAction, Thought, ThoughtStatus};
use crate::domain::ports::{MemoryService, PersistenceStore};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::make_follow_up;

pub struct ForgetHandler {
    persistence: Arc<dyn PersistenceStore>,
    memory: Option<Arc<dyn MemoryService>>,
}

impl ForgetHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, memory: Option<Arc<dyn MemoryService>>) -> Self {
        Self { persistence, memory }
    }
}

#[async_trait]
impl ActionHandler for ForgetHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Forget
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Forget(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        let (status, follow_up_text) = match &self.memory {
            Some(memory) => match memory.forget(&params.key, params.scope, &params.reason).await {
                Ok(()) => (ThoughtStatus::Completed, format!("forgot '{}': {}", params.key, params.reason)),
                Err(e) => (ThoughtStatus::Failed, format!("forget failed: {e}")),
            },
            None => (ThoughtStatus::Failed, "memory service unavailable".to_string()),
        };

        self.persistence
            .update_thought_status(ctx.thought_id, status, Some(result.clone()), Some(ctx.round_number))
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;

        Ok(HandlerOutcome {
            follow_up: Some(make_follow_up(thought, follow_up_text, status == ThoughtStatus::Completed)),
        })
    }
}
