//! External capability interfaces (spec.md §6): narrow traits the core
//! consumes without knowing the concrete backing implementation.

pub mod audit_sink;
pub mod filter_service;
pub mod llm_service;
pub mod memory_service;
pub mod persistence;
pub mod secrets_service;
pub mod side_effect_sink;

pub use audit_sink::{AuditSink, TracingAuditSink};
pub use filter_service::{FilterService, FilterServiceError};
pub use llm_service::{LlmError, LlmMessage, LlmService, ResourceUsage, ResponseModel};
pub use memory_service::{MemoryNodeRef, MemoryService, MemoryServiceError};
pub use persistence::PersistenceStore;
pub use secrets_service::{SecretReference, SecretsService, SecretsServiceError};
pub use side_effect_sink::{CommunicationService, SideEffectError, ToolService};
