//! Operator-facing CLI surface (SPEC_FULL.md §6), grounded in the teacher's
//! `cli` module layout. Thin: run the runtime, inspect tasks, manage
//! scheduled tasks. Concrete chat/HTTP transports stay out of scope
//! (spec.md §1); this binary drives the same round loop they would.

pub mod commands;
pub mod display;
pub mod output;
pub mod types;

pub use types::{Cli, Commands, ScheduleCommands, TaskCommands};
