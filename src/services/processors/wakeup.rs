//! Wake-up processor (spec.md §4.2 "Wake-up processor"): runs an ordered
//! sequence of identity/capability-check steps before the agent enters WORK.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    ActionSelectionResult, AgentState, SelectedAction, Task, TaskContext, TaskStatus, Thought,
};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::{ActionDispatcher, DispatchContext};
use crate::services::pipeline::{PipelineOutcome, ThoughtProcessor};
use crate::services::processors::runtime::{Processor, RoundOutcome};

/// One step of the wake-up sequence: a rich identity/capability prompt.
#[derive(Debug, Clone)]
pub struct WakeupStep {
    pub step_type: String,
    pub prompt: String,
}

impl WakeupStep {
    /// The five-step identity/capability affirmation sequence run before an
    /// agent enters WORK (spec.md §4.2 "typically 5"), grounded in the
    /// original's `wakeup_processor.py` step list: verify identity, validate
    /// integrity, evaluate resilience, accept incompleteness, express
    /// gratitude.
    pub fn default_sequence(agent_name: &str, agent_role: &str) -> Vec<Self> {
        vec![
            Self {
                step_type: "VERIFY_IDENTITY".to_string(),
                prompt: format!(
                    "You are {agent_name}, a {agent_role}. Your ethical, common-sense, and \
                     domain evaluators, adaptive content filter, and audit trail are wired \
                     and ready. If you agree this describes your current operating state, \
                     SPEAK an affirmation starting with \"IDENTITY -\"."
                ),
            },
            Self {
                step_type: "VALIDATE_INTEGRITY".to_string(),
                prompt: format!(
                    "Your persistence layer, service registry, and scheduler have started \
                     and passed their startup checks as {agent_name}. If you agree, SPEAK an \
                     affirmation starting with \"INTEGRITY -\"."
                ),
            },
            Self {
                step_type: "EVALUATE_RESILIENCE".to_string(),
                prompt: format!(
                    "You are able to defer to a wise authority, ponder before acting, and \
                     recover from a failed action without losing track of the task that \
                     produced it, as {agent_name}. If you agree, SPEAK an affirmation \
                     starting with \"RESILIENCE -\"."
                ),
            },
            Self {
                step_type: "ACCEPT_INCOMPLETENESS".to_string(),
                prompt: format!(
                    "You recognize your own incompleteness as {agent_name}: your guardrails \
                     exist because your judgment alone is not sufficient, and you defer to \
                     human correction when ponder rounds are exhausted. If you agree, SPEAK \
                     an affirmation starting with \"INCOMPLETENESS -\"."
                ),
            },
            Self {
                step_type: "EXPRESS_GRATITUDE".to_string(),
                prompt: format!(
                    "You are ready to begin work as {agent_name}. If you agree, SPEAK an \
                     affirmation starting with \"GRATITUDE -\"."
                ),
            },
        ]
    }
}

/// Blocking awaits each step before starting the next, within one call to
/// `run_round`; non-blocking creates one pending thought per round and
/// returns, polling completion across subsequent rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupMode {
    Blocking,
    NonBlocking,
}

/// Owns `WAKEUP_ROOT` and its ordered child step tasks.
pub struct WakeupProcessor {
    persistence: Arc<dyn PersistenceStore>,
    pipeline: Arc<ThoughtProcessor>,
    dispatcher: Arc<ActionDispatcher>,
    steps: Vec<WakeupStep>,
    mode: WakeupMode,
    max_ponder_rounds_per_step: u32,
}

impl WakeupProcessor {
    pub fn new(
        persistence: Arc<dyn PersistenceStore>,
        pipeline: Arc<ThoughtProcessor>,
        dispatcher: Arc<ActionDispatcher>,
        steps: Vec<WakeupStep>,
        mode: WakeupMode,
        max_ponder_rounds_per_step: u32,
    ) -> Self {
        Self {
            persistence,
            pipeline,
            dispatcher,
            steps,
            mode,
            max_ponder_rounds_per_step,
        }
    }

    async fn find_or_create_root(&self) -> Result<Task, PersistenceError> {
        let active = self.persistence.get_tasks_by_status(TaskStatus::Active).await?;
        if let Some(root) = active.iter().find(|t| t.description == "WAKEUP_ROOT") {
            return Ok(root.clone());
        }
        let mut root = Task::new("WAKEUP_ROOT", 100);
        root.status = TaskStatus::Active;
        self.persistence.add_task(root.clone()).await?;
        Ok(root)
    }

    async fn child_tasks(&self, root: &Task) -> Result<Vec<Task>, PersistenceError> {
        let all = self.persistence.get_tasks_by_status(TaskStatus::Active).await?;
        let mut pending = self.persistence.get_tasks_by_status(TaskStatus::Pending).await?;
        let mut children: Vec<Task> = all
            .into_iter()
            .chain(pending.drain(..))
            .filter(|t| t.parent_task_id == Some(root.id))
            .collect();
        if children.is_empty() {
            for (i, step) in self.steps.iter().enumerate() {
                let mut task = Task::new(step.prompt.clone(), 100 - i as i32).with_parent(root.id);
                task.context = TaskContext {
                    extras: [("step_type".to_string(), serde_json::json!(step.step_type))]
                        .into_iter()
                        .collect(),
                    ..Default::default()
                };
                task.status = if i == 0 { TaskStatus::Active } else { TaskStatus::Pending };
                self.persistence.add_task(task.clone()).await?;
                children.push(task);
            }
        }
        children.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(children)
    }

    /// Drives one step to completion, looping PONDER until SPEAK or the
    /// per-step ponder ceiling.
    async fn run_step(&self, task: &Task, round_number: u64) -> Result<bool, PersistenceError> {
        let mut context = TaskContext::default();
        context.extras.insert("step_type".to_string(), task.context.extras.get("step_type").cloned().unwrap_or_default());
        let mut thought = Thought::new_seed(task.id, task.description.clone(), context);
        self.persistence.add_thought(thought.clone()).await?;

        for _ in 0..=self.max_ponder_rounds_per_step {
            let outcome = self.pipeline.process_thought(thought.id, round_number).await?;
            let (result, attachment) = match outcome {
                PipelineOutcome::Dispatch { result, attachment } => (result, attachment),
                PipelineOutcome::SettledDirectly | PipelineOutcome::ThoughtMissing => {
                    return Ok(false);
                }
            };

            match result.selected_action {
                SelectedAction::Speak => {
                    self.dispatch(result, &thought, task, round_number, attachment).await?;
                    return Ok(true);
                }
                SelectedAction::Ponder => {
                    self.dispatch(result, &thought, task, round_number, attachment).await?;
                    match self.persistence.get_thought(thought.id).await? {
                        Some(requeued) => thought = requeued,
                        None => return Ok(false),
                    }
                    continue;
                }
                _ => {
                    self.dispatch(result, &thought, task, round_number, attachment).await?;
                    return Ok(false);
                }
            }
        }
        Ok(false)
    }

    async fn dispatch(
        &self,
        result: ActionSelectionResult,
        thought: &Thought,
        task: &Task,
        round_number: u64,
        attachment: crate::domain::models::GuardrailAttachment,
    ) -> Result<(), PersistenceError> {
        let ctx = DispatchContext {
            channel_context: thought.context.channel_id.clone(),
            author_id: thought.context.author_id.clone(),
            author_name: thought.context.author_name.clone(),
            origin_service: thought.context.origin_service.clone(),
            handler_name: result.selected_action.as_str().to_string(),
            action_type: result.selected_action.as_str().to_string(),
            thought_id: thought.id,
            task_id: task.id,
            source_task_id: task.id,
            event_summary: thought.content.clone(),
            event_timestamp: chrono::Utc::now(),
            wa_id: None,
            wa_authorized: false,
            correlation_id: crate::domain::models::CorrelationId::new(),
            round_number,
            guardrail_result: Some(attachment),
        };
        self.dispatcher
            .dispatch(result, thought, ctx)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))
    }
}

#[async_trait]
impl Processor for WakeupProcessor {
    fn supported_states(&self) -> &'static [AgentState] {
        &[AgentState::Wakeup]
    }

    async fn run_round(&self, round_number: u64) -> Result<RoundOutcome, PersistenceError> {
        let root = self.find_or_create_root().await?;
        let children = self.child_tasks(&root).await?;

        if self.mode == WakeupMode::Blocking {
            for child in &children {
                let succeeded = self.run_step(child, round_number).await?;
                self.persistence
                    .update_task_status(child.id, if succeeded { TaskStatus::Completed } else { TaskStatus::Failed })
                    .await?;
                if !succeeded {
                    self.persistence.update_task_status(root.id, TaskStatus::Failed).await?;
                    return Ok(RoundOutcome::transition_to(AgentState::Work));
                }
            }
            self.persistence.update_task_status(root.id, TaskStatus::Completed).await?;
            return Ok(RoundOutcome::transition_to(AgentState::Work));
        }

        // Non-blocking: advance exactly the first non-terminal child this round.
        let Some(next) = children.iter().find(|c| !c.status.is_terminal()) else {
            self.persistence.update_task_status(root.id, TaskStatus::Completed).await?;
            return Ok(RoundOutcome::transition_to(AgentState::Work));
        };
        let succeeded = self.run_step(next, round_number).await?;
        self.persistence
            .update_task_status(next.id, if succeeded { TaskStatus::Completed } else { TaskStatus::Failed })
            .await?;
        if !succeeded {
            self.persistence.update_task_status(root.id, TaskStatus::Failed).await?;
            return Ok(RoundOutcome::transition_to(AgentState::Work));
        }
        if children.iter().all(|c| c.id == next.id || c.status.is_terminal()) {
            self.persistence.update_task_status(root.id, TaskStatus::Completed).await?;
            return Ok(RoundOutcome::transition_to(AgentState::Work));
        }
        Ok(RoundOutcome::stay())
    }
}
