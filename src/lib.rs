//! `aegis`: an autonomous agent runtime built around a Task/Thought data
//! model, a per-state processor round loop, a regulated thought-processing
//! pipeline (context build, DMAs, action selection, guardrails, dispatch),
//! and a cooperative task scheduler.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod services;

pub use error::AegisError;
