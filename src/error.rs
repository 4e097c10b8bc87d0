//! Top-level error aggregate (SPEC_FULL.md §6 ambient stack): used at the
//! boundaries between application services and `anyhow`-free call sites.
//! `main.rs`/the CLI glue use `anyhow::Result` directly, as the teacher does.

use thiserror::Error;

use crate::domain::errors::{DispatchError, GuardrailError, PersistenceError, SchedulerError};

#[derive(Error, Debug)]
pub enum AegisError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Guardrail(#[from] GuardrailError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
