//! The thought-processing pipeline (spec.md §4.3): the most regulated
//! subsystem. `ThoughtProcessor::process_thought` implements Steps 1-9.

use std::sync::Arc;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    ActionParameters, ActionSelectionResult, AgentProfile, GuardrailAttachment, SelectedAction,
    Thought, ThoughtContext, ThoughtStatus,
};
use crate::domain::ports::llm_service::{LlmMessage, ResponseModel};
use crate::domain::ports::{LlmService, MemoryService, PersistenceStore};
use crate::services::context_builder::ContextBuilder;
use crate::services::dma_orchestrator::{run_dma_with_retries, DmaOrchestrator};
use crate::services::guardrails::GuardrailPipeline;

/// What Step 5's memory-meta short-circuit and the dispatcher need to know:
/// either dispatch a result, or the pipeline already settled the thought.
pub enum PipelineOutcome {
    Dispatch {
        result: ActionSelectionResult,
        attachment: GuardrailAttachment,
    },
    SettledDirectly,
    ThoughtMissing,
}

pub struct ThoughtProcessor {
    persistence: Arc<dyn PersistenceStore>,
    llm: Arc<dyn LlmService>,
    memory: Option<Arc<dyn MemoryService>>,
    context_builder: ContextBuilder,
    dma_orchestrator: DmaOrchestrator,
    guardrails: GuardrailPipeline,
    profile: AgentProfile,
    max_ponder_rounds: u32,
    retry_limit: u32,
    timeout_seconds: u64,
}

impl ThoughtProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persistence: Arc<dyn PersistenceStore>,
        llm: Arc<dyn LlmService>,
        memory: Option<Arc<dyn MemoryService>>,
        context_builder: ContextBuilder,
        dma_orchestrator: DmaOrchestrator,
        guardrails: GuardrailPipeline,
        profile: AgentProfile,
        max_ponder_rounds: u32,
        retry_limit: u32,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            persistence,
            llm,
            memory,
            context_builder,
            dma_orchestrator,
            guardrails,
            profile,
            max_ponder_rounds,
            retry_limit,
            timeout_seconds,
        }
    }

    #[tracing::instrument(skip(self), fields(thought_id = %thought_id))]
    pub async fn process_thought(
        &self,
        thought_id: crate::domain::models::ThoughtId,
        round_number: u64,
    ) -> Result<PipelineOutcome, PersistenceError> {
        // Step 1 — fetch & context build.
        let Some(thought) = self.persistence.get_thought(thought_id).await? else {
            tracing::warn!("thought disappeared before the pipeline could run");
            return Ok(PipelineOutcome::ThoughtMissing);
        };
        let Some(task) = self.persistence.get_task(thought.source_task_id).await? else {
            tracing::warn!("source task missing for thought; synthesizing DEFER");
            return Ok(self.terminal(ActionSelectionResult::synthetic_defer(
                "source task missing",
                serde_json::json!({}),
            )));
        };

        let context = self.context_builder.build(&thought, &task, round_number).await?;

        // Step 2 — initial DMAs in parallel.
        let dma_results = self.dma_orchestrator.run(&thought, self.profile.dsdma.as_deref()).await;

        // Step 3 — critical-failure gate.
        if dma_results.critical_failure() {
            let reason = format!("DMA(s) failed: {}", dma_results.failed_dmas.join(", "));
            return Ok(self.terminal(ActionSelectionResult::synthetic_defer(reason, serde_json::json!({}))));
        }

        // Step 4 — action selection.
        let selected = match self
            .select_action(&thought, &context, &dma_results, thought.ponder_count, None)
            .await
        {
            Ok(result) => result,
            Err(message) => {
                return Ok(self.terminal(ActionSelectionResult::synthetic_defer(
                    "DMA timeout",
                    serde_json::json!({"error": message}),
                )))
            }
        };

        // Step 5 — special short-circuits.
        if selected.selected_action == SelectedAction::TaskComplete {
            return Ok(PipelineOutcome::Dispatch {
                result: selected,
                attachment: GuardrailAttachment::default(),
            });
        }
        if thought.thought_type == crate::domain::models::thought_type::MEMORY_META {
            if let Some(memory) = &self.memory {
                let nick = thought.context.author_name.clone().unwrap_or_default();
                let channel = thought.context.channel_id.clone().unwrap_or_default();
                let metadata = serde_json::json!({"thought_id": thought.id.to_string()});
                let _ = memory.memorize(&nick, &channel, metadata, false).await;
            }
            self.persistence
                .update_thought_status(thought.id, ThoughtStatus::Completed, None, Some(round_number))
                .await?;
            return Ok(PipelineOutcome::SettledDirectly);
        }

        // Step 6 — guardrails.
        let (outcome, rewritten) = self
            .guardrails
            .evaluate(&selected)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        if !outcome.is_overridden() {
            return Ok(PipelineOutcome::Dispatch {
                result: selected,
                attachment: GuardrailAttachment::default(),
            });
        }

        let override_reason = match &outcome {
            crate::domain::models::GuardrailOutcome::Overridden { override_reason, .. } => override_reason.clone(),
            crate::domain::models::GuardrailOutcome::Pass => unreachable!(),
        };
        let overridden_result = rewritten.expect("override always carries a rewritten action");

        // DEFER overrides are terminal; no retry.
        if overridden_result.selected_action == SelectedAction::Defer {
            return Ok(PipelineOutcome::Dispatch {
                result: overridden_result,
                attachment: GuardrailAttachment {
                    overridden: true,
                    original_action: Some(Box::new(selected)),
                    override_reason: Some(override_reason),
                    retry_attempted: false,
                    retry_also_overridden: false,
                },
            });
        }

        // Step 7 — single recursive re-selection on PONDER override.
        let feedback = serde_json::json!({
            "failed_action": selected.selected_action.as_str(),
            "failure_reason": override_reason,
        });
        let retry_result = self
            .select_action(&thought, &context, &dma_results, thought.ponder_count, Some(feedback))
            .await;

        match retry_result {
            Ok(retry) => {
                let (retry_outcome, retry_rewritten) = self
                    .guardrails
                    .evaluate(&retry)
                    .await
                    .map_err(|e| PersistenceError::Backend(e.to_string()))?;
                if retry_outcome.is_overridden() {
                    // Retry also failed guardrails: keep the original PONDER override.
                    Ok(PipelineOutcome::Dispatch {
                        result: overridden_result,
                        attachment: GuardrailAttachment {
                            overridden: true,
                            original_action: Some(Box::new(selected)),
                            override_reason: Some(override_reason),
                            retry_attempted: true,
                            retry_also_overridden: true,
                        },
                    })
                } else {
                    let _ = retry_rewritten;
                    Ok(PipelineOutcome::Dispatch {
                        result: retry,
                        attachment: GuardrailAttachment {
                            overridden: true,
                            original_action: Some(Box::new(selected)),
                            override_reason: Some(override_reason),
                            retry_attempted: true,
                            retry_also_overridden: false,
                        },
                    })
                }
            }
            Err(message) => Ok(self.terminal(ActionSelectionResult::synthetic_defer(
                "DMA timeout",
                serde_json::json!({"error": message}),
            ))),
        }
    }

    fn terminal(&self, result: ActionSelectionResult) -> PipelineOutcome {
        PipelineOutcome::Dispatch {
            result,
            attachment: GuardrailAttachment::default(),
        }
    }

    /// Step 4 / Step 7: invoke the action-selection DMA with the triaged
    /// input bundle, optionally carrying `guardrail_feedback` for the single
    /// permitted retry.
    async fn select_action(
        &self,
        thought: &Thought,
        context: &ThoughtContext,
        dma_results: &crate::domain::models::DmaResults,
        ponder_count: u32,
        guardrail_feedback: Option<serde_json::Value>,
    ) -> Result<ActionSelectionResult, String> {
        let bundle = serde_json::json!({
            "thought": {"id": thought.id.to_string(), "content": thought.content},
            "context": context,
            "ethical": dma_results.ethical,
            "common_sense": dma_results.common_sense,
            "domain_specific": dma_results.domain_specific,
            "current_ponder_count": ponder_count,
            "max_ponder_rounds": self.max_ponder_rounds,
            "permitted_actions": self.profile.permitted_actions,
            "profile": self.profile.name,
            "guardrail_feedback": guardrail_feedback,
        });

        let llm = self.llm.clone();
        let retry_limit = self.retry_limit;
        let timeout_seconds = self.timeout_seconds;
        let outcome = run_dma_with_retries("action_selection", retry_limit, timeout_seconds, || {
            let llm = llm.clone();
            let bundle = bundle.clone();
            async move {
                let (value, _usage) = llm
                    .call_llm_structured(
                        vec![LlmMessage::user(bundle.to_string())],
                        ResponseModel::ActionSelection,
                        1024,
                        0.2,
                    )
                    .await?;
                serde_json::from_value::<ActionSelectionResult>(value)
                    .map_err(|e| crate::domain::ports::llm_service::LlmError::InvalidResponse(e.to_string()))
            }
        })
        .await;

        outcome.map_err(|e| e.to_string())
    }
}

/// Applies a guardrail attachment's tagged parameters variant check: a
/// handler coercing `action_parameters` refuses a mismatched tag (spec.md
/// §9 "tagged action parameters"). Shared here since both the dispatcher
/// and several handlers need it.
pub fn matches_tag(params: &ActionParameters, expected: SelectedAction) -> bool {
    params.selected_action() == expected
}
