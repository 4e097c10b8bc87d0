use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{ActionParameters, ActionSelectionResult, SelectedAction, Thought, ThoughtStatus};
use crate::domain::ports::{MemoryService, PersistenceStore};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::make_follow_up;

/// Grounded in `original_source/ciris_engine/core/action_handlers/memorize_handler.py`:
/// resolves a user nickname from params/context/task, then delegates to the
/// memory service.
pub struct MemorizeHandler {
    persistence: Arc<dyn PersistenceStore>,
    memory: Option<Arc<dyn MemoryService>>,
}

impl MemorizeHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, memory: Option<Arc<dyn MemoryService>>) -> Self {
        Self { persistence, memory }
    }
}

#[async_trait]
impl ActionHandler for MemorizeHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Memorize
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Memorize(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        let user_nick = ctx.author_name.clone().or_else(|| thought.context.author_name.clone());
        let channel = ctx.channel_context.clone().or_else(|| thought.context.channel_id.clone());

        let (status, follow_up_text) = match (&self.memory, user_nick, channel) {
            (Some(memory), Some(nick), Some(channel)) => {
                match memory.memorize(&nick, &channel, params.value.clone(), false).await {
                    Ok(()) => (ThoughtStatus::Completed, format!("memorized '{}' in scope {:?}", params.key, params.scope)),
                    Err(e) => (ThoughtStatus::Failed, format!("memorize failed: {e}")),
                }
            }
            (None, _, _) => (ThoughtStatus::Failed, "memory service unavailable".to_string()),
            _ => (ThoughtStatus::Failed, "missing user_nick or channel for MEMORIZE".to_string()),
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
