use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{ActionParameters, ActionSelectionResult, SelectedAction, Thought, ThoughtStatus};
use crate::domain::ports::{CommunicationService, PersistenceStore};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};
use crate::services::handlers::make_follow_up;

pub struct SpeakHandler {
    comms: Arc<dyn CommunicationService>,
    persistence: Arc<dyn PersistenceStore>,
    snore_channel: String,
}

impl SpeakHandler {
    pub fn new(comms: Arc<dyn CommunicationService>, persistence: Arc<dyn PersistenceStore>, snore_channel: impl Into<String>) -> Self {
        Self {
            comms,
            persistence,
            snore_channel: snore_channel.into(),
        }
    }
}

#[async_trait]
impl ActionHandler for SpeakHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Speak
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Speak(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        // Channel resolution mirrors the pipeline's (spec.md §4.4 "SPEAK").
        let channel = params
            .channel_id
            .clone()
            .or_else(|| ctx.channel_context.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.snore_channel.clone());

        if params.content.is_empty() || channel.is_empty() {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        }

        let sent = self.comms.send_message(&channel, &params.content, None).await;
        let success = sent.is_ok();

        self.persistence
            .update_thought_status(
                ctx.thought_id,
                if success { ThoughtStatus::Completed } else { ThoughtStatus::Failed },
                Some(result.clone()),
                Some(ctx.round_number),
            )
            .await
            .ok();

        let follow_up_content = if success {
            format!("Said \"{}\" in {channel}. Consider TASK_COMPLETE if the task is finished.", params.content)
        } else {
            format!("Failed to speak in {channel}: {}", sent.err().map(|e| e.to_string()).unwrap_or_default())
        };

        Ok(HandlerOutcome {
            follow_up: Some(make_follow_up(thought, follow_up_content, success)),
        })
    }
}
