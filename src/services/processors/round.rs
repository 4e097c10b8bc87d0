//! Shared round-loop machinery: the seed-thought/queue/dispatch cycle used
//! by the Work processor, and the cycle-guard for follow-up lineage
//! (spec.md §9 "Follow-ups are a strict tree rooted at a seed").

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    thought_type, TaskContext, TaskId, TaskStatus, Thought, ThoughtId, ThoughtStatus,
};
use crate::domain::ports::PersistenceStore;
use crate::services::dispatcher::{ActionDispatcher, DispatchContext};
use crate::services::pipeline::{PipelineOutcome, ThoughtProcessor};

/// Per-round counters, logged but not persisted (SPEC_FULL.md §4.2: ambient
/// `round_summary`, matching the original's end-of-round log line).
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundSummary {
    pub queued: usize,
    pub dispatched: usize,
    pub deferred: usize,
}

/// Guards the follow-up thought tree against cycles: walks `parent_thought_id`
/// links already in the store and refuses a parent assignment that would
/// revisit an ancestor.
pub struct TaskThoughtGraph;

impl TaskThoughtGraph {
    pub async fn would_cycle(
        persistence: &dyn PersistenceStore,
        task_id: TaskId,
        candidate_parent: ThoughtId,
    ) -> Result<bool, PersistenceError> {
        let thoughts = persistence.get_thoughts_by_task_id(task_id).await?;
        let by_id: std::collections::HashMap<ThoughtId, &Thought> = thoughts.iter().map(|t| (t.id, t)).collect();

        let mut seen = HashSet::new();
        let mut cursor = Some(candidate_parent);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                return Ok(true);
            }
            cursor = by_id.get(&id).and_then(|t| t.parent_thought_id);
        }
        Ok(false)
    }
}

/// Step 2/3 of the round: activate pending tasks up to the cap, then seed a
/// thought for every ACTIVE task that has none.
pub async fn activate_and_seed(
    persistence: &dyn PersistenceStore,
    max_active_tasks: usize,
) -> Result<(), PersistenceError> {
    let active_count = persistence.count_tasks(Some(TaskStatus::Active)).await? as usize;
    let capacity = max_active_tasks.saturating_sub(active_count);
    if capacity > 0 {
        for task in persistence.get_pending_tasks_for_activation(capacity).await? {
            persistence.update_task_status(task.id, TaskStatus::Active).await?;
        }
    }

    for task in persistence.get_tasks_needing_seed_thought(max_active_tasks).await? {
        let mut context = TaskContext {
            author_name: task.context.author_name.clone(),
            author_id: task.context.author_id.clone(),
            channel_id: task.context.channel_id.clone(),
            origin_service: task.context.origin_service.clone(),
            extras: Default::default(),
        };
        context
            .extras
            .insert("initial_task_context".to_string(), serde_json::to_value(&task.context).unwrap_or_default());
        let seed = Thought::new_seed(task.id, format!("Initial seed thought for task: {}", task.description), context);
        persistence.add_thought(seed).await?;
    }
    Ok(())
}

/// Step 4: populate the bounded queue, giving memory-meta thoughts
/// exclusive preemption within the round (spec.md §4.2 Step 4).
pub async fn fill_queue(
    persistence: &dyn PersistenceStore,
    max_active_thoughts: usize,
) -> Result<Vec<Thought>, PersistenceError> {
    let pending = persistence.get_pending_thoughts_for_active_tasks(max_active_thoughts).await?;
    let memory_meta: Vec<Thought> = pending
        .iter()
        .filter(|t| t.thought_type == thought_type::MEMORY_META)
        .cloned()
        .collect();
    if !memory_meta.is_empty() {
        return Ok(memory_meta);
    }
    Ok(pending)
}

/// Steps 5-7: mark queued thoughts PROCESSING, run the pipeline
/// concurrently, dispatch terminal results, then re-check each source
/// task for completion.
pub async fn run_queue(
    persistence: &Arc<dyn PersistenceStore>,
    pipeline: &Arc<ThoughtProcessor>,
    dispatcher: &Arc<ActionDispatcher>,
    queue: Vec<Thought>,
    round_number: u64,
) -> Result<RoundSummary, PersistenceError> {
    let mut summary = RoundSummary {
        queued: queue.len(),
        ..Default::default()
    };

    let mut handles = Vec::with_capacity(queue.len());
    for thought in queue {
        persistence
            .update_thought_status(thought.id, ThoughtStatus::Processing, None, Some(round_number))
            .await?;

        let persistence = persistence.clone();
        let pipeline = pipeline.clone();
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            process_one(&persistence, &pipeline, &dispatcher, thought.id, round_number).await
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(Some(dispatched))) => {
                summary.dispatched += 1;
                if dispatched {
                    summary.deferred += 1;
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "round: thought processing failed"),
            Err(e) => tracing::warn!(error = %e, "round: thought task panicked"),
        }
    }

    Ok(summary)
}

/// Runs one thought through the pipeline and dispatcher; returns
/// `Some(true)` if the terminal action was DEFER (for the round summary).
async fn process_one(
    persistence: &Arc<dyn PersistenceStore>,
    pipeline: &Arc<ThoughtProcessor>,
    dispatcher: &Arc<ActionDispatcher>,
    thought_id: ThoughtId,
    round_number: u64,
) -> Result<Option<bool>, PersistenceError> {
    let outcome = pipeline.process_thought(thought_id, round_number).await?;
    let (result, attachment) = match outcome {
        PipelineOutcome::Dispatch { result, attachment } => (result, attachment),
        PipelineOutcome::SettledDirectly | PipelineOutcome::ThoughtMissing => return Ok(None),
    };

    let Some(thought) = persistence.get_thought(thought_id).await? else {
        return Ok(None);
    };
    let is_defer = result.selected_action == crate::domain::models::SelectedAction::Defer;

    let ctx = DispatchContext {
        channel_context: thought.context.channel_id.clone(),
        author_id: thought.context.author_id.clone(),
        author_name: thought.context.author_name.clone(),
        origin_service: thought.context.origin_service.clone(),
        handler_name: result.selected_action.as_str().to_string(),
        action_type: result.selected_action.as_str().to_string(),
        thought_id,
        task_id: thought.source_task_id,
        source_task_id: thought.source_task_id,
        event_summary: thought.content.clone(),
        event_timestamp: chrono::Utc::now(),
        wa_id: None,
        wa_authorized: false,
        correlation_id: crate::domain::models::CorrelationId::new(),
        round_number,
        guardrail_result: Some(attachment),
    };

    dispatcher
        .dispatch(result, &thought, ctx)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;

    // Step 7 (post-dispatch): task-completion check.
    if let Some(task) = persistence.get_task(thought.source_task_id).await? {
        if task.status == TaskStatus::Active {
            let remaining = persistence.get_thoughts_by_task_id(task.id).await?;
            let has_open = remaining
                .iter()
                .any(|t| matches!(t.status, ThoughtStatus::Pending | ThoughtStatus::Processing));
            if !has_open {
                persistence.update_task_status(task.id, TaskStatus::Completed).await?;
            }
        }
    }

    Ok(Some(is_defer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::models::Task;

    #[tokio::test]
    async fn no_cycle_for_a_fresh_follow_up_chain() {
        let store = InMemoryStore::new();
        let task = Task::new("t", 0);
        store.add_task(task.clone()).await.unwrap();

        let seed = Thought::new_seed(task.id, "seed", TaskContext::default());
        store.add_thought(seed.clone()).await.unwrap();
        let follow_up = Thought::new_follow_up(&seed, "follow up");
        store.add_thought(follow_up.clone()).await.unwrap();

        assert!(!TaskThoughtGraph::would_cycle(&store, task.id, follow_up.id).await.unwrap());
    }

    #[tokio::test]
    async fn detects_a_cycle_in_the_follow_up_chain() {
        let store = InMemoryStore::new();
        let task = Task::new("t", 0);
        store.add_task(task.clone()).await.unwrap();

        let seed = Thought::new_seed(task.id, "seed", TaskContext::default());
        store.add_thought(seed.clone()).await.unwrap();
        let mut follow_up = Thought::new_follow_up(&seed, "follow up");
        // Simulate a caller rewriting `parent_thought_id` to point back at
        // itself, closing the loop the guard exists to catch.
        follow_up.parent_thought_id = Some(follow_up.id);
        store.add_thought(follow_up.clone()).await.unwrap();

        assert!(TaskThoughtGraph::would_cycle(&store, task.id, follow_up.id).await.unwrap());
    }
}
