use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{
    ActionParameters, ActionSelectionResult, DeferParams, SelectedAction, Thought,
};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::DeferHandler;

/// Increments `ponder_count` and re-queues as PENDING; escalates to the
/// DEFER path once `ponder_count >= max_ponder_rounds` (spec.md §4.3
/// Step 8, §4.4 "PONDER").
pub struct PonderHandler {
    persistence: Arc<dyn PersistenceStore>,
    defer: Arc<DeferHandler>,
    max_ponder_rounds: u32,
}

impl PonderHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, defer: Arc<DeferHandler>, max_ponder_rounds: u32) -> Self {
        Self {
            persistence,
            defer,
            max_ponder_rounds,
        }
    }
}

#[async_trait]
impl ActionHandler for PonderHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Ponder
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Ponder(params) = &result.action_parameters else {
            return Ok(HandlerOutcome { follow_up: None });
        };

        self.persistence
            .record_ponder(ctx.thought_id, params.questions.clone())
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;

        if thought.ponder_count + 1 < self.max_ponder_rounds {
            return Ok(HandlerOutcome { follow_up: None });
        }

        let defer_params = DeferParams {
            reason: "maximum ponder rounds reached".to_string(),
            context: serde_json::json!({"ponder_notes": params.questions}),
            defer_until: None,
        };
        let defer_result = ActionSelectionResult::new(
            ActionParameters::Defer(defer_params.clone()),
            "escalated from PONDER: maximum ponder rounds reached",
        );
        self.defer.defer(&defer_params, &defer_result, thought, ctx).await
    }
}
