use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{
    thought_type, ActionParameters, ActionSelectionResult, SelectedAction, Thought, ThoughtStatus,
};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::make_follow_up;

/// In "active" mode creates a follow-up thought of type
/// `active_observation_result` describing what the bounded read surfaced
/// (the read itself is owned by the `Observer` contract, §4.6 — concrete
/// transports are out of scope here); in passive mode just completes.
pub struct ObserveHandler {
    persistence: Arc<dyn PersistenceStore>,
}

impl ObserveHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl ActionHandler for ObserveHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Observe
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Observe(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        self.persistence
            .update_thought_status(ctx.thought_id, ThoughtStatus::Completed, Some(result.clone()), Some(ctx.round_number))
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;

        if !params.active {
            return Ok(HandlerOutcome { follow_up: None });
        }

        let mut follow_up = make_follow_up(
            thought,
            format!("active observation of channel {} completed", params.channel_id),
            true,
        );
        follow_up.thought_type = thought_type::ACTIVE_OBSERVATION_RESULT.to_string();
        Ok(HandlerOutcome { follow_up: Some(follow_up) })
    }
}
