//! Domain models: Task, Thought, ActionSelectionResult, DMA results,
//! ScheduledTask, Correlation, and supporting types (spec.md §3).

pub mod action;
pub mod agent_state;
pub mod correlation;
pub mod deferral;
pub mod dma;
pub mod guardrail;
pub mod ids;
pub mod memory;
pub mod profile;
pub mod scheduled_task;
pub mod system_snapshot;
pub mod task;
pub mod thought;

pub use action::{
    ActionParameters, ActionSelectionResult, DeferParams, ForgetParams, MemorizeParams,
    ObserveParams, PonderParams, RecallParams, RejectParams, SelectedAction, SpeakParams,
    ToolParams,
};
pub use agent_state::AgentState;
pub use correlation::{Correlation, CorrelationStatus, ServiceType};
pub use deferral::{DeferralReport, DeferralReportContext};
pub use dma::{CsdmaResult, DmaResults, DsdmaResult, EthicalDmaResult};
pub use guardrail::{GuardrailAttachment, GuardrailOutcome};
pub use ids::{CorrelationId, ScheduledTaskId, TaskId, ThoughtId};
pub use memory::{MemoryNodeType, MemoryScope};
pub use profile::AgentProfile;
pub use scheduled_task::{DeferralHistoryEntry, ScheduledTask, ScheduledTaskStatus};
pub use system_snapshot::{resolve_channel_id, StatusCounts, SystemSnapshot, ThoughtContext};
pub use task::{Task, TaskContext, TaskStatus};
pub use thought::{thought_type, Thought, ThoughtStatus};
