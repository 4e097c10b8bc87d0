//! Action dispatcher (spec.md §4.4): routes a guardrail-approved
//! `ActionSelectionResult` to its registered handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DispatchError;
use crate::domain::models::{
    ActionSelectionResult, CorrelationId, GuardrailAttachment, SelectedAction, TaskId, ThoughtId,
};
use crate::domain::ports::{AuditSink, PersistenceStore};
use crate::services::processors::TaskThoughtGraph;

/// Everything a handler needs beyond the `ActionSelectionResult` itself
/// (spec.md §4.4 "The DispatchContext carried to every handler").
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub channel_context: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub origin_service: Option<String>,
    pub handler_name: String,
    pub action_type: String,
    pub thought_id: ThoughtId,
    pub task_id: TaskId,
    pub source_task_id: TaskId,
    pub event_summary: String,
    pub event_timestamp: DateTime<Utc>,
    pub wa_id: Option<String>,
    pub wa_authorized: bool,
    pub correlation_id: CorrelationId,
    pub round_number: u64,
    pub guardrail_result: Option<GuardrailAttachment>,
}

/// Outcome of a handler's `handle` invocation, consumed by the dispatcher
/// to decide the thought's terminal status and whether to persist a
/// follow-up (spec.md §4.4 "Handler contract").
pub struct HandlerOutcome {
    pub follow_up: Option<crate::domain::models::Thought>,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action(&self) -> SelectedAction;

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &crate::domain::models::Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError>;
}

pub struct ActionDispatcher {
    handlers: HashMap<SelectedAction, Arc<dyn ActionHandler>>,
    persistence: Arc<dyn PersistenceStore>,
    audit: Arc<dyn AuditSink>,
    registry_timeout: Duration,
}

impl ActionDispatcher {
    /// Builds a dispatcher, validating at startup that every `SelectedAction`
    /// variant has a registered handler (spec.md §9 redesign note).
    pub fn new(
        handlers: Vec<Arc<dyn ActionHandler>>,
        persistence: Arc<dyn PersistenceStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, DispatchError> {
        let mut map = HashMap::new();
        for handler in handlers {
            map.insert(handler.action(), handler);
        }
        for action in SelectedAction::ALL {
            if !map.contains_key(&action) {
                return Err(DispatchError::UnknownAction(action.as_str().to_string()));
            }
        }
        Ok(Self {
            handlers: map,
            persistence,
            audit,
            registry_timeout: Duration::from_secs(30),
        })
    }

    #[tracing::instrument(skip(self, result, thought, ctx), fields(thought_id = %ctx.thought_id, action = result.selected_action.as_str()))]
    pub async fn dispatch(
        &self,
        result: ActionSelectionResult,
        thought: &crate::domain::models::Thought,
        ctx: DispatchContext,
    ) -> Result<(), DispatchError> {
        // Step 1: validate the action is known.
        let Some(handler) = self.handlers.get(&result.selected_action) else {
            self.persistence
                .update_thought_status(
                    ctx.thought_id,
                    crate::domain::models::ThoughtStatus::Failed,
                    Some(result.clone()),
                    Some(ctx.round_number),
                )
                .await
                .ok();
            return Err(DispatchError::UnknownAction(result.selected_action.as_str().to_string()));
        };

        self.audit
            .log_action(result.selected_action.as_str(), serde_json::json!({"thought_id": ctx.thought_id.to_string()}), "start")
            .await;

        // Step 3: bounded wait for the service registry. Handlers in this
        // crate are always constructed with their services resolved, so the
        // wait is effectively instantaneous; kept to honor the contract for
        // handlers built against a lazily-initializing registry.
        let handled = tokio::time::timeout(self.registry_timeout, handler.handle(&result, thought, &ctx)).await;

        let outcome = match handled {
            Err(_) => {
                tracing::warn!("service registry not ready within timeout; dispatch skipped");
                return Ok(());
            }
            Ok(Err(e)) => {
                self.persistence
                    .update_thought_status(
                        ctx.thought_id,
                        crate::domain::models::ThoughtStatus::Failed,
                        Some(result.clone()),
                        Some(ctx.round_number),
                    )
                    .await
                    .ok();
                self.audit
                    .log_action(result.selected_action.as_str(), serde_json::json!({"error": e.to_string()}), "failure")
                    .await;
                return Err(e);
            }
            Ok(Ok(outcome)) => outcome,
        };

        if let Some(follow_up) = outcome.follow_up {
            let cycle_check = match follow_up.parent_thought_id {
                Some(parent_id) => {
                    TaskThoughtGraph::would_cycle(self.persistence.as_ref(), follow_up.source_task_id, parent_id).await
                }
                None => Ok(false),
            };
            let add_result = match cycle_check {
                Ok(true) => Err(DispatchError::FollowUpCreationFailed(
                    "follow-up would introduce a cycle in the thought lineage tree".to_string(),
                )),
                Ok(false) => self
                    .persistence
                    .add_thought(follow_up)
                    .await
                    .map_err(|e| DispatchError::FollowUpCreationFailed(e.to_string())),
                Err(e) => Err(DispatchError::FollowUpCreationFailed(e.to_string())),
            };
            if let Err(e) = add_result {
                self.persistence
                    .update_thought_status(
                        ctx.thought_id,
                        crate::domain::models::ThoughtStatus::Failed,
                        Some(result.clone()),
                        Some(ctx.round_number),
                    )
                    .await
                    .ok();
                return Err(e);
            }
        }

        self.audit
            .log_action(result.selected_action.as_str(), serde_json::json!({"thought_id": ctx.thought_id.to_string()}), "success")
            .await;
        Ok(())
    }
}
