//! Shutdown processor (spec.md §4.2 "Shutdown processor"): creates a single
//! high-priority shutdown task, runs it through the pipeline once, and
//! classifies the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    AgentState, SelectedAction, Task, TaskContext, TaskStatus, Thought,
};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::{ActionDispatcher, DispatchContext};
use crate::services::pipeline::{PipelineOutcome, ThoughtProcessor};
use crate::services::processors::runtime::{Processor, RoundOutcome};

/// Carried on the shutdown task's context (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownContext {
    pub reason: String,
    pub initiated_by: String,
    pub allow_deferral: bool,
    pub expected_reactivation: Option<chrono::DateTime<chrono::Utc>>,
    pub is_terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Accepted,
    Rejected,
    Error,
}

pub struct ShutdownProcessor {
    persistence: Arc<dyn PersistenceStore>,
    pipeline: Arc<ThoughtProcessor>,
    dispatcher: Arc<ActionDispatcher>,
    context: ShutdownContext,
}

impl ShutdownProcessor {
    pub fn new(
        persistence: Arc<dyn PersistenceStore>,
        pipeline: Arc<ThoughtProcessor>,
        dispatcher: Arc<ActionDispatcher>,
        context: ShutdownContext,
    ) -> Self {
        Self {
            persistence,
            pipeline,
            dispatcher,
            context,
        }
    }
}

#[async_trait]
impl Processor for ShutdownProcessor {
    fn supported_states(&self) -> &'static [AgentState] {
        &[AgentState::Shutdown]
    }

    async fn run_round(&self, round_number: u64) -> Result<RoundOutcome, PersistenceError> {
        let mut task = Task::new(
            format!("shutdown_{}", uuid::Uuid::new_v4().simple()),
            100,
        );
        task.status = TaskStatus::Active;
        task.context = TaskContext {
            extras: [(
                "shutdown_context".to_string(),
                serde_json::to_value(&self.context).unwrap_or_default(),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        self.persistence.add_task(task.clone()).await?;

        let seed = Thought::new_seed(task.id, self.context.reason.clone(), task.context.clone());
        self.persistence.add_thought(seed.clone()).await?;

        let outcome = self.pipeline.process_thought(seed.id, round_number).await?;
        let (result, attachment) = match outcome {
            PipelineOutcome::Dispatch { result, attachment } => (result, attachment),
            PipelineOutcome::SettledDirectly | PipelineOutcome::ThoughtMissing => {
                self.persistence.update_task_status(task.id, TaskStatus::Failed).await?;
                tracing::error!("shutdown thought settled without a dispatchable result; treating as error");
                return Ok(RoundOutcome::stay());
            }
        };

        let selected_action = result.selected_action;
        let ctx = DispatchContext {
            channel_context: seed.context.channel_id.clone(),
            author_id: seed.context.author_id.clone(),
            author_name: seed.context.author_name.clone(),
            origin_service: seed.context.origin_service.clone(),
            handler_name: selected_action.as_str().to_string(),
            action_type: selected_action.as_str().to_string(),
            thought_id: seed.id,
            task_id: task.id,
            source_task_id: task.id,
            event_summary: seed.content.clone(),
            event_timestamp: chrono::Utc::now(),
            wa_id: None,
            wa_authorized: false,
            correlation_id: crate::domain::models::CorrelationId::new(),
            round_number,
            guardrail_result: Some(attachment),
        };

        self.dispatcher
            .dispatch(result, &seed, ctx)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let task_after = self.persistence.get_task(task.id).await?;
        let outcome = match task_after.map(|t| t.status) {
            Some(TaskStatus::Completed) => ShutdownOutcome::Accepted,
            Some(TaskStatus::Rejected) => ShutdownOutcome::Rejected,
            _ if selected_action == SelectedAction::Reject => ShutdownOutcome::Rejected,
            _ => ShutdownOutcome::Error,
        };

        match outcome {
            ShutdownOutcome::Accepted => {
                tracing::info!("shutdown accepted");
                Ok(RoundOutcome::stay())
            }
            ShutdownOutcome::Rejected => {
                tracing::warn!(reason = %result_reason(&self.persistence, task.id).await, "shutdown rejected; returning to WORK");
                Ok(RoundOutcome::transition_to(AgentState::Work))
            }
            ShutdownOutcome::Error => {
                tracing::error!("shutdown errored; returning to WORK");
                Ok(RoundOutcome::transition_to(AgentState::Work))
            }
        }
    }
}

async fn result_reason(persistence: &Arc<dyn PersistenceStore>, task_id: crate::domain::models::TaskId) -> String {
    persistence
        .get_task(task_id)
        .await
        .ok()
        .flatten()
        .and_then(|t| t.outcome)
        .unwrap_or_else(|| "unspecified".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::console::ConsoleCommunicationService;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::models::AgentProfile;
    use crate::domain::ports::llm_service::{LlmError, LlmMessage, ResourceUsage, ResponseModel};
    use crate::domain::ports::{CommunicationService, LlmService, TracingAuditSink};
    use crate::services::context_builder::{ChannelDefaults, ContextBuilder};
    use crate::services::dispatcher::{ActionDispatcher, ActionHandler};
    use crate::services::dma_orchestrator::DmaOrchestrator;
    use crate::services::guardrails::{GuardrailPipeline, GuardrailsConfig};
    use crate::services::handlers::{
        DeferHandler, ForgetHandler, MemorizeHandler, ObserveHandler, PonderHandler, RecallHandler,
        RejectHandler, SpeakHandler, TaskCompleteHandler, ToolHandler,
    };

    /// Always proposes the same action-selection response, approving every
    /// DMA along the way.
    struct FixedLlmService {
        action_selection: serde_json::Value,
    }

    #[async_trait]
    impl LlmService for FixedLlmService {
        async fn call_llm_structured(
            &self,
            _messages: Vec<LlmMessage>,
            response_model: ResponseModel,
            _max_tokens: u32,
            _temperature: f64,
        ) -> Result<(serde_json::Value, ResourceUsage), LlmError> {
            let value = match response_model {
                ResponseModel::Ethical => serde_json::json!({
                    "alignment_check": "no concerns", "decision": "approve", "rationale": "scripted",
                }),
                ResponseModel::CommonSense => serde_json::json!({
                    "plausibility_score": 1.0, "flags": [], "reasoning": "scripted",
                }),
                ResponseModel::DomainSpecific => serde_json::json!({
                    "domain": "none", "score": 1.0, "flags": [], "reasoning": "scripted", "recommended_action": null,
                }),
                ResponseModel::ActionSelection => self.action_selection.clone(),
            };
            Ok((value, ResourceUsage::default()))
        }
    }

    fn reject_response() -> serde_json::Value {
        serde_json::json!({
            "selected_action": "REJECT",
            "action_parameters": {
                "selected_action": "REJECT",
                "reason": "shutdown is not authorized right now",
                "create_filter": false,
            },
            "rationale": "scripted reject",
        })
    }

    fn build_processor(llm_response: serde_json::Value) -> (Arc<dyn PersistenceStore>, ShutdownProcessor) {
        let persistence = Arc::new(InMemoryStore::new());
        let llm: Arc<dyn LlmService> = Arc::new(FixedLlmService { action_selection: llm_response });
        let comms: Arc<dyn CommunicationService> = Arc::new(ConsoleCommunicationService::new());
        let audit = Arc::new(TracingAuditSink);

        let context_builder = ContextBuilder::new(persistence.clone() as Arc<dyn PersistenceStore>, ChannelDefaults::default(), None);
        let dma_orchestrator = DmaOrchestrator::new(llm.clone(), 1, 5);
        let guardrails = GuardrailPipeline::new(&GuardrailsConfig { entropy_threshold: 0.0, coherence_threshold: 0.0 });

        let pipeline = Arc::new(ThoughtProcessor::new(
            persistence.clone() as Arc<dyn PersistenceStore>,
            llm,
            None,
            context_builder,
            dma_orchestrator,
            guardrails,
            AgentProfile::default(),
            5,
            1,
            5,
        ));

        let defer = Arc::new(DeferHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, Some(comms.clone()), None));
        let handlers: Vec<Arc<dyn ActionHandler>> = vec![
            Arc::new(SpeakHandler::new(comms.clone(), persistence.clone() as Arc<dyn PersistenceStore>, "snore".to_string())),
            defer.clone(),
            Arc::new(PonderHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, defer.clone(), 5)),
            Arc::new(RejectHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
            Arc::new(ObserveHandler::new(persistence.clone() as Arc<dyn PersistenceStore>)),
            Arc::new(MemorizeHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
            Arc::new(RecallHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
            Arc::new(ForgetHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
            Arc::new(ToolHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
            Arc::new(TaskCompleteHandler::new(persistence.clone() as Arc<dyn PersistenceStore>)),
        ];
        let dispatcher = Arc::new(
            ActionDispatcher::new(handlers, persistence.clone() as Arc<dyn PersistenceStore>, audit)
                .expect("every closed action has a registered handler"),
        );

        let context = ShutdownContext {
            reason: "operator requested shutdown".to_string(),
            initiated_by: "operator".to_string(),
            allow_deferral: true,
            expected_reactivation: None,
            is_terminal: true,
        };
        let processor = ShutdownProcessor::new(persistence.clone() as Arc<dyn PersistenceStore>, pipeline, dispatcher, context);
        (persistence as Arc<dyn PersistenceStore>, processor)
    }

    #[tokio::test]
    async fn rejected_shutdown_marks_the_shutdown_task_rejected_and_returns_to_work() {
        let (persistence, processor) = build_processor(reject_response());

        let outcome = processor.run_round(1).await.unwrap();
        assert_eq!(outcome.next_state, Some(AgentState::Work));

        let rejected = persistence.get_tasks_by_status(TaskStatus::Rejected).await.unwrap();
        assert_eq!(rejected.len(), 1, "the shutdown task itself was rejected, not left FAILED");
        assert!(rejected[0].description.starts_with("shutdown_"));
    }
}
