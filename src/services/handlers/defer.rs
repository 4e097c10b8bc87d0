use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{
    ActionParameters, ActionSelectionResult, DeferParams, DeferralReport, SelectedAction, TaskStatus,
    Thought, ThoughtStatus,
};
use crate::domain::ports::{CommunicationService, PersistenceStore};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};

/// DEFER is terminal for the thought; no follow-up is created (spec.md
/// §4.4 "DEFER creates no follow-up — the scheduler or a WA correction
/// resumes work").
pub struct DeferHandler {
    persistence: Arc<dyn PersistenceStore>,
    comms: Option<Arc<dyn CommunicationService>>,
    wa_channel: Option<String>,
}

impl DeferHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, comms: Option<Arc<dyn CommunicationService>>, wa_channel: Option<String>) -> Self {
        Self {
            persistence,
            comms,
            wa_channel,
        }
    }

    pub async fn defer(
        &self,
        params: &DeferParams,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        self.persistence
            .update_thought_status(ctx.thought_id, ThoughtStatus::Deferred, Some(result.clone()), Some(ctx.round_number))
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;
        self.persistence
            .update_task_status(ctx.source_task_id, TaskStatus::Deferred)
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;

        let report = DeferralReport {
            task_id: ctx.source_task_id,
            thought_id: ctx.thought_id,
            reason: params.reason.clone(),
            context_excerpt: thought.content.chars().take(200).collect(),
            package: params.context.clone(),
        };

        if let (Some(comms), Some(channel)) = (&self.comms, &self.wa_channel) {
            if let Ok(message_id) = comms.send_message(channel, &report.render(), None).await {
                self.persistence
                    .save_deferral_report_mapping(message_id, ctx.source_task_id, ctx.thought_id, Some(params.context.clone()))
                    .await
                    .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;
            }
        }

        Ok(HandlerOutcome { follow_up: None })
    }
}

#[async_trait]
impl ActionHandler for DeferHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Defer
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Defer(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };
        self.defer(params, result, thought, ctx).await
    }
}
