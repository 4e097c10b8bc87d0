//! CLI type definitions, grounded in the teacher's `cli/types.rs`. Thin
//! operator surface only (SPEC_FULL.md §6): run the runtime, inspect tasks,
//! manage scheduled tasks.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aegisd")]
#[command(about = "aegis autonomous agent runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format.
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Path to a YAML config file (overrides the default `.aegis/config.yaml` lookup).
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent runtime's round loop until interrupted.
    Run,

    /// Scheduled-task management.
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Task inspection.
    #[command(subcommand)]
    Task(TaskCommands),
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Schedule a new one-shot or recurring task.
    Add {
        /// Human-readable name.
        #[arg(long)]
        name: String,

        /// Goal description carried into the triggered task's context.
        #[arg(long)]
        goal: String,

        /// Seed-thought prompt for the triggered task.
        #[arg(long)]
        prompt: String,

        /// Originating thought id (UUID) this schedule is attached to.
        #[arg(long)]
        origin_thought_id: String,

        /// One-shot fire time (RFC3339). Mutually exclusive with `--cron`.
        #[arg(long, group = "trigger")]
        at: Option<String>,

        /// 5-field cron expression for a recurring schedule. Mutually exclusive with `--at`.
        #[arg(long, group = "trigger")]
        cron: Option<String>,
    },

    /// List currently active scheduled tasks.
    List,

    /// Cancel a scheduled task by id.
    Cancel {
        /// Scheduled task id (UUID).
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List tasks, optionally filtered by status.
    List {
        /// Filter by status (PENDING, ACTIVE, COMPLETED, PAUSED, FAILED, DEFERRED, REJECTED).
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a single task by id.
    Show {
        /// Task id (UUID).
        id: String,
    },
}
