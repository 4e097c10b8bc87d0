//! `aegisd task list|show`, grounded in the teacher's `cli/commands/task.rs`.

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Task, TaskId, TaskStatus};
use crate::domain::ports::PersistenceStore;

#[derive(Debug, serde::Serialize)]
pub struct TaskOutput {
    pub id: String,
    pub description: String,
    pub priority: i32,
    pub status: String,
    pub parent_task_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Task> for TaskOutput {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id.to_string(),
            description: truncate(&t.description, 60),
            priority: t.priority,
            status: t.status.as_str().to_string(),
            parent_task_id: t.parent_task_id.map(|id| id.to_string()),
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = crate::cli::display::list_table(&["id", "status", "priority", "description"]);
        for t in &self.tasks {
            table.add_row(vec![&t.id[..8], &t.status, &t.priority.to_string(), &t.description]);
        }
        crate::cli::display::render_list("task", table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl CommandOutput for TaskOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Task: {}", self.id),
            format!("Status: {}", self.status),
            format!("Priority: {}", self.priority),
            format!("Description: {}", self.description),
        ];
        if let Some(parent) = &self.parent_task_id {
            lines.push(format!("Parent: {parent}"));
        }
        lines.push(format!("Created: {}", self.created_at));
        lines.push(format!("Updated: {}", self.updated_at));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn handle_list(persistence: &Arc<dyn PersistenceStore>, status: Option<String>, json_mode: bool) -> Result<()> {
    let statuses = match status {
        Some(raw) => vec![TaskStatus::from_str(&raw).with_context(|| format!("unknown task status: {raw}"))?],
        None => vec![
            TaskStatus::Pending,
            TaskStatus::Active,
            TaskStatus::Completed,
            TaskStatus::Paused,
            TaskStatus::Failed,
            TaskStatus::Deferred,
            TaskStatus::Rejected,
        ],
    };

    let mut tasks = Vec::new();
    for status in statuses {
        tasks.extend(persistence.get_tasks_by_status(status).await?);
    }

    let out = TaskListOutput {
        total: tasks.len(),
        tasks: tasks.iter().map(TaskOutput::from).collect(),
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn handle_show(persistence: &Arc<dyn PersistenceStore>, id: String, json_mode: bool) -> Result<()> {
    let uuid = Uuid::parse_str(&id).with_context(|| format!("invalid task id: {id}"))?;
    let task = persistence
        .get_task(TaskId::from(uuid))
        .await?
        .with_context(|| format!("task not found: {id}"))?;
    output(&TaskOutput::from(&task), json_mode);
    Ok(())
}
