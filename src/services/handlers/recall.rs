use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{
    ActionParameters, ActionSelectionResult, MemoryNodeType, SelectedAction, Thought, ThoughtStatus,
};
use crate::domain::ports::memory_service::MemoryNodeRef;
use crate::domain::ports::{MemoryService, PersistenceStore};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::make_follow_up;

pub struct RecallHandler {
    persistence: Arc<dyn PersistenceStore>,
    memory: Option<Arc<dyn MemoryService>>,
}

impl RecallHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, memory: Option<Arc<dyn MemoryService>>) -> Self {
        Self { persistence, memory }
    }
}

#[async_trait]
impl ActionHandler for RecallHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Recall
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Recall(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        let node = MemoryNodeRef {
            node_type: MemoryNodeType::Concept,
            key: params.query.clone(),
        };

        let (status, follow_up_text) = match &self.memory {
            Some(memory) => match memory.recall(node).await {
                Ok(value) => (ThoughtStatus::Completed, format!("recalled for '{}': {value}", params.query)),
                Err(e) => (ThoughtStatus::Failed, format!("recall failed: {e}")),
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
