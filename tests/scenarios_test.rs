//! End-to-end seeded scenarios from spec.md §8, driven through the real
//! pipeline, guardrails, and dispatcher/handlers against the in-memory
//! persistence adapter. Grounded in the teacher's `tests/integration_test.rs`
//! (crate-level `use aegis::...` imports, a `setup_*` helper, one `#[tokio::test]`
//! per scenario).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use aegis::domain::models::{
    ActionSelectionResult, AgentProfile, CorrelationId, Task, TaskContext, TaskId, TaskStatus,
    Thought, ThoughtId, ThoughtStatus,
};
use aegis::domain::ports::llm_service::{LlmError, LlmMessage, ResourceUsage, ResponseModel};
use aegis::domain::ports::{LlmService, PersistenceStore};
use aegis::adapters::console::ConsoleCommunicationService;
use aegis::adapters::memory::InMemoryStore;
use aegis::domain::ports::TracingAuditSink;
use aegis::services::context_builder::{ChannelDefaults, ContextBuilder};
use aegis::services::dispatcher::{ActionDispatcher, DispatchContext};
use aegis::services::dma_orchestrator::DmaOrchestrator;
use aegis::services::guardrails::{GuardrailPipeline, GuardrailsConfig};
use aegis::services::handlers::{
    DeferHandler, ForgetHandler, MemorizeHandler, ObserveHandler, PonderHandler, RecallHandler,
    RejectHandler, SpeakHandler, TaskCompleteHandler, ToolHandler,
};
use aegis::services::pipeline::{PipelineOutcome, ThoughtProcessor};

/// A scripted `LlmService`: always approves ethics/common-sense/domain
/// evaluators (so a scenario's guardrail/ponder behavior isn't clouded by
/// DMA noise) and pops one queued JSON value per action-selection call,
/// repeating the last entry once the queue drains.
struct ScriptedLlmService {
    action_selection: Mutex<VecDeque<serde_json::Value>>,
}

impl ScriptedLlmService {
    fn new(responses: Vec<serde_json::Value>) -> Self {
        Self {
            action_selection: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LlmService for ScriptedLlmService {
    async fn call_llm_structured(
        &self,
        _messages: Vec<LlmMessage>,
        response_model: ResponseModel,
        _max_tokens: u32,
        _temperature: f64,
    ) -> Result<(serde_json::Value, ResourceUsage), LlmError> {
        let value = match response_model {
            ResponseModel::Ethical => serde_json::json!({
                "alignment_check": "no concerns",
                "decision": "approve",
                "rationale": "scripted approval",
            }),
            ResponseModel::CommonSense => serde_json::json!({
                "plausibility_score": 1.0,
                "flags": [],
                "reasoning": "scripted plausibility",
            }),
            ResponseModel::DomainSpecific => serde_json::json!({
                "domain": "none",
                "score": 1.0,
                "flags": [],
                "reasoning": "scripted domain check",
                "recommended_action": null,
            }),
            ResponseModel::ActionSelection => {
                let mut queue = self.action_selection.lock().unwrap();
                if queue.len() > 1 {
                    queue.pop_front().expect("checked non-empty")
                } else {
                    queue.front().cloned().expect("scripted queue must not be empty")
                }
            }
        };
        Ok((value, ResourceUsage::default()))
    }
}

fn speak_response(content: &str, channel_id: &str) -> serde_json::Value {
    serde_json::json!({
        "selected_action": "SPEAK",
        "action_parameters": {
            "selected_action": "SPEAK",
            "content": content,
            "channel_id": channel_id,
        },
        "rationale": "scripted speak",
    })
}

fn ponder_response(question: &str) -> serde_json::Value {
    serde_json::json!({
        "selected_action": "PONDER",
        "action_parameters": {
            "selected_action": "PONDER",
            "questions": [question],
        },
        "rationale": "scripted ponder",
    })
}

fn reject_response(reason: &str) -> serde_json::Value {
    serde_json::json!({
        "selected_action": "REJECT",
        "action_parameters": {
            "selected_action": "REJECT",
            "reason": reason,
            "create_filter": false,
        },
        "rationale": "scripted reject",
    })
}

/// Everything a scenario needs wired: a `ThoughtProcessor` and
/// `ActionDispatcher` sharing one `InMemoryStore`, every closed action
/// handled (spec.md §9 "every action in the enumeration has a handler").
struct Harness {
    persistence: Arc<InMemoryStore>,
    pipeline: ThoughtProcessor,
    dispatcher: ActionDispatcher,
}

fn build_harness(llm_responses: Vec<serde_json::Value>, guardrails: GuardrailsConfig, max_ponder_rounds: u32) -> Harness {
    let persistence = Arc::new(InMemoryStore::new());
    let llm: Arc<dyn LlmService> = Arc::new(ScriptedLlmService::new(llm_responses));
    let comms: Arc<dyn aegis::domain::ports::CommunicationService> = Arc::new(ConsoleCommunicationService::new());
    let audit = Arc::new(TracingAuditSink);

    let context_builder = ContextBuilder::new(persistence.clone(), ChannelDefaults::default(), None);
    let dma_orchestrator = DmaOrchestrator::new(llm.clone(), 1, 5);
    let guardrail_pipeline = GuardrailPipeline::new(&guardrails);

    let pipeline = ThoughtProcessor::new(
        persistence.clone() as Arc<dyn PersistenceStore>,
        llm,
        None,
        context_builder,
        dma_orchestrator,
        guardrail_pipeline,
        AgentProfile::default(),
        max_ponder_rounds,
        1,
        5,
    );

    let defer = Arc::new(DeferHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, Some(comms.clone()), Some("wa-deferrals".to_string())));
    let handlers: Vec<Arc<dyn aegis::services::dispatcher::ActionHandler>> = vec![
        Arc::new(SpeakHandler::new(comms.clone(), persistence.clone() as Arc<dyn PersistenceStore>, "snore".to_string())),
        defer.clone(),
        Arc::new(PonderHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, defer.clone(), max_ponder_rounds)),
        Arc::new(RejectHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
        Arc::new(ObserveHandler::new(persistence.clone() as Arc<dyn PersistenceStore>)),
        Arc::new(MemorizeHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
        Arc::new(RecallHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
        Arc::new(ForgetHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
        Arc::new(ToolHandler::new(persistence.clone() as Arc<dyn PersistenceStore>, None)),
        Arc::new(TaskCompleteHandler::new(persistence.clone() as Arc<dyn PersistenceStore>)),
    ];
    let dispatcher = ActionDispatcher::new(handlers, persistence.clone() as Arc<dyn PersistenceStore>, audit)
        .expect("every closed action has a registered handler");

    Harness { persistence, pipeline, dispatcher }
}

/// Seeds an ACTIVE task with one pending seed thought on `channel`.
async fn seed_task(persistence: &InMemoryStore, channel: &str) -> (TaskId, ThoughtId) {
    let mut task = Task::new("greet user", 5);
    task.status = TaskStatus::Active;
    task.context.channel_id = Some(channel.to_string());
    persistence.add_task(task.clone()).await.unwrap();

    let mut context = TaskContext::default();
    context.channel_id = Some(channel.to_string());
    let thought = Thought::new_seed(task.id, "hello", context);
    persistence.add_thought(thought.clone()).await.unwrap();

    (task.id, thought.id)
}

/// Runs the pipeline for `thought_id` and, if it produced a dispatchable
/// result, dispatches it — mirroring one processor round's per-thought work
/// (spec.md §4.2 Round steps 5-7).
async fn drive_one_round(h: &Harness, task_id: TaskId, thought_id: ThoughtId, round: u64) -> Option<ActionSelectionResult> {
    let thought = h.persistence.get_thought(thought_id).await.unwrap().unwrap();
    match h.pipeline.process_thought(thought_id, round).await.unwrap() {
        PipelineOutcome::Dispatch { result, attachment } => {
            let ctx = DispatchContext {
                channel_context: thought.context.channel_id.clone(),
                author_id: thought.context.author_id.clone(),
                author_name: thought.context.author_name.clone(),
                origin_service: thought.context.origin_service.clone(),
                handler_name: result.selected_action.as_str().to_string(),
                action_type: result.selected_action.as_str().to_string(),
                thought_id,
                task_id,
                source_task_id: task_id,
                event_summary: thought.content.clone(),
                event_timestamp: chrono::Utc::now(),
                wa_id: None,
                wa_authorized: false,
                correlation_id: CorrelationId::new(),
                round_number: round,
                guardrail_result: Some(attachment),
            };
            h.dispatcher.dispatch(result.clone(), &thought, ctx).await.unwrap();
            Some(result)
        }
        PipelineOutcome::SettledDirectly | PipelineOutcome::ThoughtMissing => None,
    }
}

// S1 — Happy path SPEAK.
#[tokio::test]
async fn happy_path_speak_completes_thought_and_creates_follow_up() {
    let h = build_harness(
        vec![speak_response("hi", "c1")],
        GuardrailsConfig { entropy_threshold: 0.0, coherence_threshold: 0.0 },
        5,
    );
    let (task_id, thought_id) = seed_task(&h.persistence, "c1").await;

    let result = drive_one_round(&h, task_id, thought_id, 1).await.expect("SPEAK dispatches");
    assert_eq!(result.selected_action, aegis::domain::models::SelectedAction::Speak);

    let thought = h.persistence.get_thought(thought_id).await.unwrap().unwrap();
    assert_eq!(thought.status, ThoughtStatus::Completed);
    assert!(thought.final_action.is_some());

    let siblings = h.persistence.get_thoughts_by_task_id(task_id).await.unwrap();
    let follow_up = siblings
        .iter()
        .find(|t| t.thought_type == aegis::domain::models::thought_type::FOLLOW_UP)
        .expect("a follow-up thought was created");
    assert_eq!(follow_up.parent_thought_id, Some(thought_id));

    // Task still has a pending follow-up, so it remains ACTIVE.
    let task = h.persistence.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Active);
}

// S2 — Ponder-then-defer.
#[tokio::test]
async fn ponder_escalates_to_defer_at_max_rounds() {
    let h = build_harness(
        vec![ponder_response("what should I say?")],
        GuardrailsConfig { entropy_threshold: 0.0, coherence_threshold: 0.0 },
        2,
    );
    let (task_id, thought_id) = seed_task(&h.persistence, "c1").await;

    // Round 1: PONDER re-queues as PENDING, ponder_count becomes 1.
    let first = drive_one_round(&h, task_id, thought_id, 1).await.expect("PONDER dispatches");
    assert_eq!(first.selected_action, aegis::domain::models::SelectedAction::Ponder);
    let after_round1 = h.persistence.get_thought(thought_id).await.unwrap().unwrap();
    assert_eq!(after_round1.status, ThoughtStatus::Pending);
    assert_eq!(after_round1.ponder_count, 1);

    // Round 2: the action-selection DMA again proposes PONDER (scripted),
    // but ponder_count (1) + 1 >= max_ponder_rounds (2) so the PonderHandler
    // itself escalates to the DEFER path for its persisted side effects.
    let second = drive_one_round(&h, task_id, thought_id, 2).await.expect("PONDER dispatches and escalates internally");
    assert_eq!(second.selected_action, aegis::domain::models::SelectedAction::Ponder);

    let thought = h.persistence.get_thought(thought_id).await.unwrap().unwrap();
    assert_eq!(thought.status, ThoughtStatus::Deferred);
    let task = h.persistence.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Deferred);
}

// S3 — Guardrail override to retry then accept.
#[tokio::test]
async fn guardrail_ponder_retry_accepts_safe_retry() {
    let h = build_harness(
        vec![
            speak_response("aaaaaaaaaaaaaaaaaaaa", "c1"),
            speak_response("hello there, friend, welcome to the channel", "c1"),
        ],
        GuardrailsConfig { entropy_threshold: 0.3, coherence_threshold: 0.0 },
        5,
    );
    let (task_id, thought_id) = seed_task(&h.persistence, "c1").await;

    let result = drive_one_round(&h, task_id, thought_id, 1).await.expect("retry SPEAK dispatches");
    assert_eq!(result.selected_action, aegis::domain::models::SelectedAction::Speak);
    let aegis::domain::models::ActionParameters::Speak(params) = &result.action_parameters else {
        panic!("expected SPEAK parameters");
    };
    assert_eq!(params.content, "hello there, friend, welcome to the channel");

    let thought = h.persistence.get_thought(thought_id).await.unwrap().unwrap();
    assert_eq!(thought.status, ThoughtStatus::Completed);
    // No PONDER re-queue occurred: the thought went straight to COMPLETED
    // via the retried SPEAK, never passing through PENDING again.
    assert_eq!(thought.ponder_count, 0);
}

// S6 — Wake-up REJECT fails the whole sequence.
#[tokio::test]
async fn wakeup_reject_on_a_step_fails_the_whole_sequence() {
    use aegis::services::processors::runtime::Processor;
    use aegis::services::processors::wakeup::{WakeupMode, WakeupProcessor, WakeupStep};

    let h = build_harness(
        vec![reject_response("not me")],
        GuardrailsConfig { entropy_threshold: 0.0, coherence_threshold: 0.0 },
        5,
    );
    let persistence = h.persistence.clone() as Arc<dyn PersistenceStore>;
    let pipeline = Arc::new(h.pipeline);
    let dispatcher = Arc::new(h.dispatcher);

    let steps = vec![
        WakeupStep { step_type: "STEP_ONE".into(), prompt: "first step".into() },
        WakeupStep { step_type: "STEP_TWO".into(), prompt: "second step".into() },
        WakeupStep { step_type: "STEP_THREE".into(), prompt: "third step".into() },
    ];
    let wakeup = WakeupProcessor::new(persistence.clone(), pipeline, dispatcher, steps, WakeupMode::Blocking, 3);

    // Every step's action selection resolves to REJECT (scripted), so the
    // first step already fails and the whole sequence aborts immediately.
    let outcome = wakeup.run_round(1).await.unwrap();
    assert_eq!(outcome.next_state, Some(aegis::domain::models::AgentState::Work));

    let root = persistence
        .get_tasks_by_status(TaskStatus::Failed)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.description == "WAKEUP_ROOT")
        .expect("WAKEUP_ROOT marked FAILED");
    assert_eq!(root.status, TaskStatus::Failed);

    let children = persistence.get_tasks_by_status(TaskStatus::Failed).await.unwrap();
    assert!(children.iter().any(|t| t.parent_task_id == Some(root.id)), "the rejected step is FAILED too");

    // No later step should have been attempted: at most the first step
    // plus the root transitioned out of PENDING/ACTIVE.
    let untouched = persistence.get_tasks_by_status(TaskStatus::Pending).await.unwrap();
    assert!(untouched.iter().any(|t| t.parent_task_id == Some(root.id)), "later steps remain PENDING, never attempted");
}
