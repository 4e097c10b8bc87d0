//! `aegisd schedule add|list|cancel`, grounded in the teacher's
//! `cli/commands/schedule.rs`.

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{ScheduledTask, ScheduledTaskId, ThoughtId};
use crate::domain::ports::PersistenceStore;
use crate::services::scheduler::TaskScheduler;

#[derive(Debug, serde::Serialize)]
pub struct ScheduledTaskOutput {
    pub id: String,
    pub name: String,
    pub status: String,
    pub trigger: String,
    pub last_triggered_at: Option<String>,
    pub deferral_count: u32,
}

impl From<&ScheduledTask> for ScheduledTaskOutput {
    fn from(t: &ScheduledTask) -> Self {
        let trigger = match (&t.defer_until, &t.schedule_cron) {
            (Some(at), _) => format!("once at {at}"),
            (_, Some(cron)) => format!("cron {cron}"),
            _ => "unset".to_string(),
        };
        Self {
            id: t.task_id.to_string(),
            name: t.name.clone(),
            status: t.status.as_str().to_string(),
            trigger,
            last_triggered_at: t.last_triggered_at.map(|d| d.to_rfc3339()),
            deferral_count: t.deferral_count,
        }
    }
}

impl CommandOutput for ScheduledTaskOutput {
    fn to_human(&self) -> String {
        format!(
            "Scheduled task: {}\nID: {}\nStatus: {}\nTrigger: {}\nLast triggered: {}\nDeferral count: {}",
            self.name,
            self.id,
            self.status,
            self.trigger,
            self.last_triggered_at.as_deref().unwrap_or("never"),
            self.deferral_count,
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ScheduledTaskListOutput {
    pub schedules: Vec<ScheduledTaskOutput>,
    pub total: usize,
}

impl CommandOutput for ScheduledTaskListOutput {
    fn to_human(&self) -> String {
        let mut table = crate::cli::display::list_table(&["id", "name", "status", "trigger"]);
        for s in &self.schedules {
            table.add_row(vec![&s.id[..8], &s.name, &s.status, &s.trigger]);
        }
        crate::cli::display::render_list("scheduled task", table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ScheduleActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ScheduleActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_add(
    scheduler: &TaskScheduler,
    name: String,
    goal: String,
    prompt: String,
    origin_thought_id: String,
    at: Option<String>,
    cron: Option<String>,
    json_mode: bool,
) -> Result<()> {
    let origin = Uuid::parse_str(&origin_thought_id).with_context(|| format!("invalid thought id: {origin_thought_id}"))?;
    let defer_until = at
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .with_context(|| format!("invalid RFC3339 timestamp: {s}"))
        })
        .transpose()?;

    let scheduled = scheduler
        .schedule_task(name, goal, prompt, ThoughtId::from(origin), defer_until, cron)
        .await?;

    output(
        &ScheduleActionOutput {
            success: true,
            message: format!("Scheduled task created: {} ({})", scheduled.name, scheduled.task_id),
        },
        json_mode,
    );
    Ok(())
}

pub async fn handle_list(persistence: &Arc<dyn PersistenceStore>, json_mode: bool) -> Result<()> {
    let schedules = persistence.get_active_scheduled_tasks().await?;
    let out = ScheduledTaskListOutput {
        total: schedules.len(),
        schedules: schedules.iter().map(ScheduledTaskOutput::from).collect(),
    };
    output(&out, json_mode);
    Ok(())
}

pub async fn handle_cancel(scheduler: &TaskScheduler, id: String, json_mode: bool) -> Result<()> {
    let uuid = Uuid::parse_str(&id).with_context(|| format!("invalid scheduled task id: {id}"))?;
    let cancelled = scheduler.cancel_task(ScheduledTaskId::from(uuid)).await?;
    output(
        &ScheduleActionOutput {
            success: cancelled,
            message: if cancelled {
                format!("Scheduled task cancelled: {id}")
            } else {
                format!("Scheduled task not found: {id}")
            },
        },
        json_mode,
    );
    Ok(())
}
