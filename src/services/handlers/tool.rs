use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{ActionParameters, ActionSelectionResult, SelectedAction, Thought, ThoughtStatus};
use crate::domain::ports::{PersistenceStore, ToolService};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::make_follow_up;

pub struct ToolHandler {
    persistence: Arc<dyn PersistenceStore>,
    tools: Option<Arc<dyn ToolService>>,
}

impl ToolHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, tools: Option<Arc<dyn ToolService>>) -> Self {
        Self { persistence, tools }
    }
}

#[async_trait]
impl ActionHandler for ToolHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Tool
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Tool(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        let (status, follow_up_text) = match &self.tools {
            Some(tools) => match tools.run_tool(&params.tool_name, params.arguments.clone()).await {
                Ok(value) => (ThoughtStatus::Completed, format!("tool '{}' returned {value}", params.tool_name)),
                Err(e) => (ThoughtStatus::Failed, format!("tool '{}' failed: {e}", params.tool_name)),
            },
            None => (ThoughtStatus::Failed, "tool service unavailable".to_string()),
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
