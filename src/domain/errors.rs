//! Domain error types.
//!
//! One enum per concern, using `thiserror`, mirroring the shape of the
//! spec's error-kind table (§7): each kind knows whether it is transient
//! (safe to retry/ignore) or permanent (must surface).

use thiserror::Error;

use crate::domain::models::{TaskId, ThoughtId};

/// Errors raised while mutating or querying Tasks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
}

/// Errors raised while mutating or querying Thoughts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThoughtError {
    #[error("thought not found: {0}")]
    NotFound(ThoughtId),

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("parent thought {0} would create a cycle in the thought lineage")]
    CyclicLineage(ThoughtId),
}

/// Errors raised by a DMA invocation (`run_dma_with_retries`).
#[derive(Error, Debug, Clone)]
pub enum DmaError {
    #[error("DMA timed out after {attempts} attempt(s): {message}")]
    Timeout { attempts: u32, message: String },

    #[error("DMA reported a critical failure: {0}")]
    CriticalFailure(String),
}

/// Errors raised by the guardrail stage. Guardrail *overrides* are not
/// errors (they are a policy decision, see `GuardrailOutcome`); this enum
/// only covers failures of the guardrail machinery itself.
#[derive(Error, Debug, Clone)]
pub enum GuardrailError {
    #[error("guardrail '{0}' failed to evaluate: {1}")]
    EvaluationFailed(String, String),
}

/// Errors raised while dispatching an `ActionSelectionResult` to a handler.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("no handler registered for action {0}")]
    UnknownAction(String),

    #[error("service registry was not ready within the timeout")]
    RegistryTimeout,

    #[error("handler execution failed: {0}")]
    HandlerExecutionFailed(String),

    #[error("handler failed to create its required follow-up thought: {0}")]
    FollowUpCreationFailed(String),
}

/// Errors raised by the task scheduler.
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),

    #[error("exactly one of defer_until or schedule_cron must be set")]
    AmbiguousTrigger,

    #[error("scheduled task not found: {0}")]
    NotFound(String),
}

/// Errors raised by a persistence operation. All are, by the spec's failure
/// model, retryable by the caller; `is_transient` exists so callers can
/// decide whether to count/log-and-continue or escalate.
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    #[error("persistence backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PersistenceError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Errors raised by an observer while ingesting an external message.
#[derive(Error, Debug, Clone)]
pub enum ObserverError {
    #[error("secrets filter failed: {0}")]
    SecretsFilterFailed(String),

    #[error("deferral report context not found for message {0}")]
    DeferralContextNotFound(String),
}

/// Convenience result alias used across the domain layer.
pub type DomainResult<T, E = PersistenceError> = Result<T, E>;
