//! Builds the `SystemSnapshot`/`ThoughtContext` consumed by Step 1 of the
//! pipeline (spec.md §4.3 Step 1, §9 "typed ThoughtContext record").

use std::sync::Arc;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    resolve_channel_id, StatusCounts, SystemSnapshot, Task, TaskStatus, Thought, ThoughtContext,
    ThoughtStatus,
};
use crate::domain::ports::PersistenceStore;

/// Ambient facts threaded through every pipeline run; resolved once at
/// startup from configuration (spec.md §6 `agent_mode` / channel defaults).
#[derive(Debug, Clone, Default)]
pub struct ChannelDefaults {
    pub env_default: Option<String>,
    pub config_default: Option<String>,
}

pub struct ContextBuilder {
    persistence: Arc<dyn PersistenceStore>,
    channel_defaults: ChannelDefaults,
    identity_summary: Option<String>,
}

impl ContextBuilder {
    pub fn new(
        persistence: Arc<dyn PersistenceStore>,
        channel_defaults: ChannelDefaults,
        identity_summary: Option<String>,
    ) -> Self {
        Self {
            persistence,
            channel_defaults,
            identity_summary,
        }
    }

    pub async fn build(
        &self,
        thought: &Thought,
        task: &Task,
        round_number: u64,
    ) -> Result<ThoughtContext, PersistenceError> {
        let snapshot = self.build_snapshot(task, round_number).await?;

        let (resolved_channel, source) = resolve_channel_id(
            task.context.channel_id.as_deref(),
            thought.context.channel_id.as_deref(),
            self.channel_defaults.env_default.as_deref(),
            self.channel_defaults.config_default.as_deref(),
        );

        let mut snapshot = snapshot;
        snapshot.resolved_channel_id = resolved_channel;

        let identity_context = match &self.identity_summary {
            Some(summary) => format!("{summary} (channel resolved via {source})"),
            None => format!("channel resolved via {source}"),
        };

        let mut context = ThoughtContext {
            task_context: thought.context.clone(),
            system_snapshot: snapshot,
            identity_context,
            extras: thought.context.extras.clone(),
        };
        context.extras.entry("round_number".into()).or_insert_with(|| serde_json::json!(round_number));
        Ok(context)
    }

    async fn build_snapshot(&self, task: &Task, round_number: u64) -> Result<SystemSnapshot, PersistenceError> {
        let mut task_status_counts = StatusCounts::default();
        for status in [
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Completed,
            TaskStatus::Paused,
            TaskStatus::Failed,
            TaskStatus::Deferred,
            TaskStatus::Rejected,
        ] {
            let count = self.persistence.count_tasks(Some(status)).await?;
            for _ in 0..count {
                task_status_counts.record(status);
            }
        }

        let thought_status_counts = StatusCounts {
            pending: self
                .persistence
                .get_thoughts_by_status(ThoughtStatus::Pending)
                .await?
                .len() as u64,
            ..StatusCounts::default()
        };

        let recent_completed = self.persistence.get_recent_completed_tasks(5).await?;
        let top_pending = self.persistence.get_top_tasks(5).await?;

        Ok(SystemSnapshot {
            task_status_counts,
            thought_status_counts,
            current_task_summary: Some(task.description.clone()),
            current_thought_summary: None,
            recent_completed_task_ids: recent_completed.iter().map(|t| t.id).collect(),
            top_pending_task_ids: top_pending.iter().map(|t| t.id).collect(),
            resolved_channel_id: String::new(),
            detected_secret_refs: Vec::new(),
            user_profiles: None,
            telemetry: None,
            resources: None,
            agent_identity_summary: self.identity_summary.clone(),
            current_round_number: round_number,
            service_health: std::collections::HashMap::new(),
        })
    }
}
