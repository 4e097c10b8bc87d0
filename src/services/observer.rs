//! Observer / event ingress contract (spec.md §4.6), grounded in
//! `original_source/ciris_engine/adapters/base_observer.py`: a
//! `BoundedHistory` ring buffer per channel, a secrets filter pass, a
//! priority filter pass, and passive/priority Task+Thought creation. The
//! WA-correction reply path is grounded in the same file's
//! `_add_to_feedback_queue`/deferral reply handling.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::ObserverError;
use crate::domain::models::{
    thought_type, MemoryNodeType, MemoryScope, Task, TaskContext, TaskId, Thought, ThoughtId,
};
use crate::domain::ports::memory_service::{MemoryNodeRef, MemoryService};
use crate::domain::ports::persistence::PersistenceStore;
use crate::domain::ports::secrets_service::SecretsService;

/// Default bounded-history depth (spec.md §4.6 "default 10 messages"),
/// matching the original's `PASSIVE_CONTEXT_LIMIT`.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// A single inbound message as seen by an observer, independent of the
/// originating transport.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
    pub is_agent_message: bool,
    pub origin_service: String,
}

/// Outcome of running a message through an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverOutcome {
    /// The agent's own message, or otherwise intentionally dropped.
    Ignored,
    Created { task_id: TaskId, thought_id: ThoughtId },
}

/// Escalation level assigned by the priority filter (spec.md §4.6:
/// "default MEDIUM, may escalate to HIGH/CRITICAL").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPriority {
    Medium,
    High,
    Critical,
}

impl FilterPriority {
    fn task_priority(self) -> i32 {
        match self {
            Self::Medium => 0,
            Self::High => 5,
            Self::Critical => 10,
        }
    }

    fn is_priority(self) -> bool {
        !matches!(self, Self::Medium)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Result of the priority-filter pass.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub priority: FilterPriority,
    pub should_process: bool,
    pub reasoning: String,
    pub triggered_filters: Vec<String>,
    pub confidence: Option<f64>,
}

impl Default for FilterResult {
    /// Fail-open default (spec.md §5 "Observers that cannot enqueue ...
    /// must fail safe by processing the message normally rather than
    /// dropping it"), matching `_apply_message_filtering`'s
    /// no-filter-service branch.
    fn default() -> Self {
        Self {
            priority: FilterPriority::Medium,
            should_process: true,
            reasoning: "no priority filter configured".to_string(),
            triggered_filters: Vec::new(),
            confidence: None,
        }
    }
}

/// Priority-filter capability. A null-object default is provided below for
/// environments that don't wire a real one (SPEC_FULL.md §4.6).
#[async_trait]
pub trait PriorityFilter: Send + Sync {
    async fn evaluate(&self, message: &RawMessage, history: &[RawMessage]) -> FilterResult;
}

/// Fail-open passthrough, matching the teacher's `NullEmbedding`/
/// `NullMemoryRepository` null-object idiom.
pub struct PassthroughPriorityFilter;

#[async_trait]
impl PriorityFilter for PassthroughPriorityFilter {
    async fn evaluate(&self, _message: &RawMessage, _history: &[RawMessage]) -> FilterResult {
        FilterResult::default()
    }
}

/// Per-channel bounded history, mirroring the original's `recent_messages`
/// deque capped at `PASSIVE_CONTEXT_LIMIT`.
#[derive(Debug, Default)]
pub struct BoundedHistory {
    limit: usize,
    messages: VecDeque<RawMessage>,
}

impl BoundedHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            messages: VecDeque::with_capacity(limit),
        }
    }

    pub fn push(&mut self, message: RawMessage) {
        if self.messages.len() == self.limit {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn recent(&self) -> Vec<RawMessage> {
        self.messages.iter().cloned().collect()
    }
}

/// Observer: translates external events into Tasks and seed Thoughts
/// (spec.md §4.6). One instance owns its own `BoundedHistory` per channel;
/// it never invokes the pipeline directly.
pub struct Observer {
    persistence: Arc<dyn PersistenceStore>,
    secrets: Option<Arc<dyn SecretsService>>,
    memory: Option<Arc<dyn MemoryService>>,
    priority_filter: Arc<dyn PriorityFilter>,
    history_limit: usize,
    histories: tokio::sync::Mutex<std::collections::HashMap<String, BoundedHistory>>,
    origin_service: String,
}

impl Observer {
    pub fn new(
        persistence: Arc<dyn PersistenceStore>,
        secrets: Option<Arc<dyn SecretsService>>,
        memory: Option<Arc<dyn MemoryService>>,
        priority_filter: Arc<dyn PriorityFilter>,
        history_limit: usize,
        origin_service: impl Into<String>,
    ) -> Self {
        Self {
            persistence,
            secrets,
            memory,
            priority_filter,
            history_limit,
            histories: tokio::sync::Mutex::new(std::collections::HashMap::new()),
            origin_service: origin_service.into(),
        }
    }

    pub fn with_defaults(persistence: Arc<dyn PersistenceStore>, origin_service: impl Into<String>) -> Self {
        Self::new(
            persistence,
            None,
            None,
            Arc::new(PassthroughPriorityFilter),
            DEFAULT_HISTORY_LIMIT,
            origin_service,
        )
    }

    /// Runs one inbound message through the full ingress contract
    /// (spec.md §4.6).
    pub async fn on_message(&self, message: RawMessage) -> Result<ObserverOutcome, ObserverError> {
        if message.is_agent_message {
            return Ok(ObserverOutcome::Ignored);
        }

        let history = {
            let mut guard = self.histories.lock().await;
            let entry = guard
                .entry(message.channel_id.clone())
                .or_insert_with(|| BoundedHistory::new(self.history_limit));
            let recent = entry.recent();
            entry.push(message.clone());
            recent
        };

        let redacted_content = match &self.secrets {
            Some(secrets) => {
                let (redacted, _refs) = secrets
                    .process_incoming_text(
                        &message.content,
                        &format!("{} message from {}", self.origin_service, message.author_name),
                        &message.message_id,
                    )
                    .await
                    .map_err(|e| ObserverError::SecretsFilterFailed(e.to_string()))?;
                redacted
            }
            None => message.content.clone(),
        };

        let filter = self.priority_filter.evaluate(&message, &history).await;
        // Fail-safe: even should_process=false never drops the message; it
        // only suppresses escalation (spec.md §5 "must fail safe by
        // processing the message normally rather than dropping it").
        let effective_priority = if filter.should_process {
            filter.priority
        } else {
            FilterPriority::Medium
        };

        self.recall_context(&message, &history).await;

        let (task, thought) = if effective_priority.is_priority() {
            self.build_priority_observation(&message, &redacted_content, effective_priority, &filter)
        } else {
            self.build_passive_observation(&message, &redacted_content, &history)
        };

        self.persistence.add_task(task.clone()).await.map_err(|e| ObserverError::SecretsFilterFailed(e.to_string()))?;
        self.persistence.add_thought(thought.clone()).await.map_err(|e| ObserverError::SecretsFilterFailed(e.to_string()))?;

        Ok(ObserverOutcome::Created { task_id: task.id, thought_id: thought.id })
    }

    /// Best-effort context recall across CHANNEL/USER nodes
    /// (`_get_recall_ids`/`_recall_context` in the original); swallows
    /// errors, since recall failing must never block ingress.
    async fn recall_context(&self, message: &RawMessage, history: &[RawMessage]) {
        let Some(memory) = &self.memory else { return };
        let _ = memory
            .recall(MemoryNodeRef { node_type: MemoryNodeType::Channel, key: message.channel_id.clone() })
            .await;
        let mut seen_authors = std::collections::HashSet::new();
        seen_authors.insert(message.author_id.clone());
        for past in history {
            if seen_authors.insert(past.author_id.clone()) {
                let _ = memory
                    .recall(MemoryNodeRef { node_type: MemoryNodeType::User, key: past.author_id.clone() })
                    .await;
            }
        }
        let _ = memory
            .recall(MemoryNodeRef { node_type: MemoryNodeType::User, key: message.author_id.clone() })
            .await;
        let _ = MemoryScope::Local; // scopes are consumed by the memory adapter itself
    }

    fn build_passive_observation(&self, message: &RawMessage, content: &str, history: &[RawMessage]) -> (Task, Thought) {
        let description = format!(
            "Respond to message from @{} in #{}: '{}'",
            message.author_name, message.channel_id, content
        );
        let mut context = TaskContext {
            author_name: Some(message.author_name.clone()),
            author_id: Some(message.author_id.clone()),
            channel_id: Some(message.channel_id.clone()),
            origin_service: Some(self.origin_service.clone()),
            ..Default::default()
        };
        context.extras.insert("message_id".to_string(), serde_json::json!(message.message_id));
        context.extras.insert("observation_type".to_string(), serde_json::json!("passive"));
        context.extras.insert(
            "recent_messages".to_string(),
            serde_json::json!(history.iter().map(|m| m.content.clone()).collect::<Vec<_>>()),
        );

        let task = Task::new(description, 0).with_context(context.clone());
        let thought = Thought::new_seed(
            task.id,
            format!("User @{} said: {}", message.author_name, content),
            context,
        )
        .with_thought_type(thought_type::OBSERVATION);
        (task, thought)
    }

    fn build_priority_observation(
        &self,
        message: &RawMessage,
        content: &str,
        priority: FilterPriority,
        filter: &FilterResult,
    ) -> (Task, Thought) {
        let description = format!(
            "PRIORITY: Respond to {} message from @{} in #{}: '{}'",
            priority.as_str(),
            message.author_name,
            message.channel_id,
            content
        );
        let mut context = TaskContext {
            author_name: Some(message.author_name.clone()),
            author_id: Some(message.author_id.clone()),
            channel_id: Some(message.channel_id.clone()),
            origin_service: Some(self.origin_service.clone()),
            ..Default::default()
        };
        context.extras.insert("message_id".to_string(), serde_json::json!(message.message_id));
        context.extras.insert("observation_type".to_string(), serde_json::json!("priority"));
        context.extras.insert("filter_priority".to_string(), serde_json::json!(priority.as_str()));
        context.extras.insert("filter_reasoning".to_string(), serde_json::json!(filter.reasoning));
        context.extras.insert("triggered_filters".to_string(), serde_json::json!(filter.triggered_filters));
        context.extras.insert("filter_confidence".to_string(), serde_json::json!(filter.confidence));

        let task = Task::new(description, priority.task_priority()).with_context(context.clone());
        let thought = Thought::new_seed(
            task.id,
            format!(
                "PRIORITY ({}): User @{} said: {} | Filter: {}",
                priority.as_str(),
                message.author_name,
                content,
                filter.reasoning
            ),
            context,
        )
        .with_thought_type(thought_type::OBSERVATION)
        .with_priority(priority.task_priority());
        (task, thought)
    }

    /// WA-correction reply path (spec.md §4.6): recovers
    /// `(task_id, thought_id)` for a previously-sent deferral report and
    /// creates a `correction` Thought on the same task, with the original
    /// deferred thought as `parent_thought_id`.
    pub async fn handle_correction_reply(
        &self,
        reply_to_message_id: &str,
        corrector_id: &str,
        corrector_name: &str,
        content: &str,
    ) -> Result<ObserverOutcome, ObserverError> {
        let ctx = self
            .persistence
            .get_deferral_report_context(reply_to_message_id)
            .await
            .map_err(|e| ObserverError::DeferralContextNotFound(e.to_string()))?
            .ok_or_else(|| ObserverError::DeferralContextNotFound(reply_to_message_id.to_string()))?;

        let original_thought = self
            .persistence
            .get_thought(ctx.thought_id)
            .await
            .map_err(|e| ObserverError::DeferralContextNotFound(e.to_string()))?
            .ok_or_else(|| ObserverError::DeferralContextNotFound(ctx.thought_id.to_string()))?;

        let mut context = original_thought.context.clone();
        context.extras.insert("is_wa_correction".to_string(), serde_json::json!(true));
        context.extras.insert("wa_author_id".to_string(), serde_json::json!(corrector_id));
        context.extras.insert("wa_author_name".to_string(), serde_json::json!(corrector_name));
        context.extras.insert("correction_of_thought_id".to_string(), serde_json::json!(ctx.thought_id.to_string()));
        context.extras.insert("corrected_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));

        let mut correction = Thought::new_follow_up(&original_thought, content.to_string());
        correction.thought_type = thought_type::CORRECTION.to_string();
        correction.context = context;

        self.persistence
            .add_thought(correction.clone())
            .await
            .map_err(|e| ObserverError::DeferralContextNotFound(e.to_string()))?;

        if let Some(task) = self
            .persistence
            .get_task(ctx.task_id)
            .await
            .map_err(|e| ObserverError::DeferralContextNotFound(e.to_string()))?
        {
            if task.status == crate::domain::models::TaskStatus::Deferred {
                self.persistence
                    .update_task_status(ctx.task_id, crate::domain::models::TaskStatus::Active)
                    .await
                    .map_err(|e| ObserverError::DeferralContextNotFound(e.to_string()))?;
            }
        }

        Ok(ObserverOutcome::Created { task_id: ctx.task_id, thought_id: correction.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;

    fn msg(id: &str, author: &str, content: &str) -> RawMessage {
        RawMessage {
            message_id: id.to_string(),
            channel_id: "general".to_string(),
            author_id: format!("u-{author}"),
            author_name: author.to_string(),
            content: content.to_string(),
            is_agent_message: false,
            origin_service: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn agent_own_message_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let observer = Observer::with_defaults(store, "test");
        let mut m = msg("1", "bot", "hi");
        m.is_agent_message = true;
        assert_eq!(observer.on_message(m).await.unwrap(), ObserverOutcome::Ignored);
    }

    #[tokio::test]
    async fn passive_message_creates_task_and_seed_thought() {
        let store = Arc::new(InMemoryStore::new());
        let observer = Observer::with_defaults(store.clone(), "test");
        let outcome = observer.on_message(msg("1", "alice", "hello there")).await.unwrap();
        let ObserverOutcome::Created { task_id, thought_id } = outcome else { panic!("expected created") };
        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.priority, 0);
        let thought = store.get_thought(thought_id).await.unwrap().unwrap();
        assert_eq!(thought.thought_type, thought_type::OBSERVATION);
    }

    #[tokio::test]
    async fn bounded_history_evicts_oldest() {
        let mut history = BoundedHistory::new(2);
        history.push(msg("1", "a", "one"));
        history.push(msg("2", "a", "two"));
        history.push(msg("3", "a", "three"));
        let recent = history.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message_id, "2");
    }

    struct AlwaysCritical;
    #[async_trait]
    impl PriorityFilter for AlwaysCritical {
        async fn evaluate(&self, _m: &RawMessage, _h: &[RawMessage]) -> FilterResult {
            FilterResult {
                priority: FilterPriority::Critical,
                should_process: true,
                reasoning: "matched urgent keyword".to_string(),
                triggered_filters: vec!["urgent".to_string()],
                confidence: Some(0.9),
            }
        }
    }

    #[tokio::test]
    async fn critical_priority_escalates_task_priority() {
        let store = Arc::new(InMemoryStore::new());
        let observer = Observer::new(store.clone(), None, None, Arc::new(AlwaysCritical), DEFAULT_HISTORY_LIMIT, "test");
        let outcome = observer.on_message(msg("1", "alice", "help now")).await.unwrap();
        let ObserverOutcome::Created { task_id, thought_id } = outcome else { panic!("expected created") };
        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.priority, 10);
        let thought = store.get_thought(thought_id).await.unwrap().unwrap();
        assert_eq!(thought.priority, 10);
    }

    #[tokio::test]
    async fn correction_reply_recovers_context_and_links_parent() {
        let store = Arc::new(InMemoryStore::new());
        let mut task = Task::new("original", 0);
        task.status = crate::domain::models::TaskStatus::Deferred;
        store.add_task(task.clone()).await.unwrap();
        let original = Thought::new_seed(task.id, "deferred thought", TaskContext::default());
        store.add_thought(original.clone()).await.unwrap();
        store
            .save_deferral_report_mapping("msg-42".to_string(), task.id, original.id, None)
            .await
            .unwrap();

        let observer = Observer::with_defaults(store.clone(), "test");
        let outcome = observer
            .handle_correction_reply("msg-42", "wa-1", "Alice", "use option B instead")
            .await
            .unwrap();
        let ObserverOutcome::Created { task_id, thought_id } = outcome else { panic!("expected created") };
        assert_eq!(task_id, task.id);
        let correction = store.get_thought(thought_id).await.unwrap().unwrap();
        assert_eq!(correction.parent_thought_id, Some(original.id));
        assert_eq!(correction.thought_type, thought_type::CORRECTION);
        assert_eq!(correction.context.extras.get("is_wa_correction"), Some(&serde_json::json!(true)));
        let reactivated = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(reactivated.status, crate::domain::models::TaskStatus::Active);
    }
}
