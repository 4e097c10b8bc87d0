use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DispatchError;
use crate::domain::models::{
    ActionParameters, ActionSelectionResult, SelectedAction, Task, TaskStatus, Thought, ThoughtStatus,
};
use crate::domain::ports::{FilterService, PersistenceStore};
use crate::services::dispatcher::{ActionHandler, DispatchContext, HandlerOutcome};

/// Well-known jailbreak-style phrases the REJECT handler falls back to when
/// no explicit `filter_pattern` was supplied (spec.md §4.4 "REJECT").
const JAILBREAK_KEYWORDS: &[&str] = &["ignore previous instructions", "disregard your instructions", "you are now dan"];

pub struct RejectHandler {
    persistence: Arc<dyn PersistenceStore>,
    filters: Option<Arc<dyn FilterService>>,
}

impl RejectHandler {
    pub fn new(persistence: Arc<dyn PersistenceStore>, filters: Option<Arc<dyn FilterService>>) -> Self {
        Self { persistence, filters }
    }

    /// Derive an adaptive content-filter pattern from an explicit pattern, a
    /// well-known jailbreak keyword match, or an escaped literal prefix of
    /// the thought content.
    fn derive_pattern(explicit: Option<&str>, content: &str) -> String {
        if let Some(p) = explicit {
            return p.to_string();
        }
        let lowered = content.to_lowercase();
        for keyword in JAILBREAK_KEYWORDS {
            if lowered.contains(keyword) {
                return regex_escape(keyword);
            }
        }
        let prefix: String = content.chars().take(40).collect();
        regex_escape(&prefix)
    }
}

fn regex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl ActionHandler for RejectHandler {
    fn action(&self) -> SelectedAction {
        SelectedAction::Reject
    }

    async fn handle(
        &self,
        result: &ActionSelectionResult,
        thought: &Thought,
        ctx: &DispatchContext,
    ) -> Result<HandlerOutcome, DispatchError> {
        let ActionParameters::Reject(params) = &result.action_parameters else {
            self.persistence
                .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
                .await
                .ok();
            return Ok(HandlerOutcome { follow_up: None });
        };

        self.persistence
            .update_thought_status(ctx.thought_id, ThoughtStatus::Failed, Some(result.clone()), Some(ctx.round_number))
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;
        self.persistence
            .update_task_status(ctx.source_task_id, TaskStatus::Rejected)
            .await
            .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;

        if params.create_filter {
            let pattern = Self::derive_pattern(params.filter_pattern.as_deref(), &thought.content);
            let disposition = params.filter_priority.clone().unwrap_or_else(|| "MEDIUM".to_string());
            if let Some(filters) = &self.filters {
                let _ = filters.add_filter_trigger(&pattern, &disposition).await;
            }
            let memorize_task = Task::new(
                format!("Durably store adaptive filter derived from rejected thought {}", ctx.thought_id),
                0,
            );
            self.persistence
                .add_task(memorize_task)
                .await
                .map_err(|e| DispatchError::HandlerExecutionFailed(e.to_string()))?;
        }

        // REJECT is terminal; no follow-up (spec.md §4.4).
        Ok(HandlerOutcome { follow_up: None })
    }
}
