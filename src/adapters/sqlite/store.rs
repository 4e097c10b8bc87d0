//! `SqliteStore`: the single adapter implementing `PersistenceStore`
//! against one connection pool (SPEC_FULL.md §4.1), grounded row-by-row in
//! the teacher's per-aggregate repositories (`task_repository.rs`,
//! `task_schedule_repository.rs`) but consolidated into one struct since
//! this crate has one port trait rather than five.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{
    ActionSelectionResult, Correlation, CorrelationId, CorrelationStatus, DeferralHistoryEntry,
    DeferralReportContext, ScheduledTask, ScheduledTaskId, ScheduledTaskStatus, ServiceType, Task,
    TaskContext, TaskId, TaskStatus, Thought, ThoughtId, ThoughtStatus,
};

/// Emit a warning when a serialized context/content JSON blob exceeds this
/// size (teacher's `JSON_SIZE_WARN_BYTES` convention).
const JSON_SIZE_WARN_BYTES: usize = 64 * 1024;

fn warn_if_large(field: &str, id: impl std::fmt::Display, json: &str) {
    if json.len() > JSON_SIZE_WARN_BYTES {
        tracing::warn!(id = %id, field, size_bytes = json.len(), "serialized field exceeds size threshold");
    }
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn parse_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>, PersistenceError> {
    s.map(|s| parse_dt(&s)).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid, PersistenceError> {
    Uuid::parse_str(s).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn parse_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, PersistenceError> {
    serde_json::from_str(s).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

/// SQLite-backed `PersistenceStore` (SPEC_FULL.md §4.1).
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    description: String,
    priority: i64,
    parent_task_id: Option<String>,
    context: String,
    outcome: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, PersistenceError> {
        Ok(Task {
            id: TaskId(parse_uuid(&self.id)?),
            description: self.description,
            priority: self.priority as i32,
            parent_task_id: self.parent_task_id.map(|s| parse_uuid(&s)).transpose()?.map(TaskId),
            context: parse_json(&self.context)?,
            outcome: self.outcome,
            status: TaskStatus::from_str(&self.status)
                .ok_or_else(|| PersistenceError::Serialization(format!("invalid task status: {}", self.status)))?,
            created_at: parse_dt(&self.created_at)?,
            updated_at: parse_dt(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ThoughtRow {
    id: String,
    source_task_id: String,
    parent_thought_id: Option<String>,
    thought_type: String,
    content: String,
    context: String,
    priority: i64,
    round_number: i64,
    ponder_count: i64,
    ponder_notes: Option<String>,
    final_action: Option<String>,
    status: String,
    round_processed: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl ThoughtRow {
    fn into_thought(self) -> Result<Thought, PersistenceError> {
        Ok(Thought {
            id: ThoughtId(parse_uuid(&self.id)?),
            source_task_id: TaskId(parse_uuid(&self.source_task_id)?),
            parent_thought_id: self.parent_thought_id.map(|s| parse_uuid(&s)).transpose()?.map(ThoughtId),
            thought_type: self.thought_type,
            content: self.content,
            context: parse_json(&self.context)?,
            priority: self.priority as i32,
            round_number: self.round_number as u64,
            ponder_count: self.ponder_count as u32,
            ponder_notes: self.ponder_notes.map(|s| parse_json(&s)).transpose()?,
            final_action: self.final_action.map(|s| parse_json(&s)).transpose()?,
            status: ThoughtStatus::from_str(&self.status)
                .ok_or_else(|| PersistenceError::Serialization(format!("invalid thought status: {}", self.status)))?,
            round_processed: self.round_processed.map(|v| v as u64),
            created_at: parse_dt(&self.created_at)?,
            updated_at: parse_dt(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CorrelationRow {
    correlation_id: String,
    service_type: String,
    handler_name: String,
    action_type: String,
    request_data: String,
    response_data: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl CorrelationRow {
    fn into_correlation(self) -> Result<Correlation, PersistenceError> {
        Ok(Correlation {
            correlation_id: CorrelationId(parse_uuid(&self.correlation_id)?),
            service_type: service_type_from_str(&self.service_type)?,
            handler_name: self.handler_name,
            action_type: self.action_type,
            request_data: parse_json(&self.request_data)?,
            response_data: self.response_data.map(|s| parse_json(&s)).transpose()?,
            status: correlation_status_from_str(&self.status)?,
            created_at: parse_dt(&self.created_at)?,
            updated_at: parse_dt(&self.updated_at)?,
        })
    }
}

fn service_type_from_str(s: &str) -> Result<ServiceType, PersistenceError> {
    match s {
        "LLM" => Ok(ServiceType::Llm),
        "MEMORY" => Ok(ServiceType::Memory),
        "COMMUNICATION" => Ok(ServiceType::Communication),
        "TOOL" => Ok(ServiceType::Tool),
        "SECRETS" => Ok(ServiceType::Secrets),
        "AUDIT" => Ok(ServiceType::Audit),
        "FILTER" => Ok(ServiceType::Filter),
        other => Err(PersistenceError::Serialization(format!("invalid service type: {other}"))),
    }
}

fn service_type_as_str(s: &ServiceType) -> &'static str {
    match s {
        ServiceType::Llm => "LLM",
        ServiceType::Memory => "MEMORY",
        ServiceType::Communication => "COMMUNICATION",
        ServiceType::Tool => "TOOL",
        ServiceType::Secrets => "SECRETS",
        ServiceType::Audit => "AUDIT",
        ServiceType::Filter => "FILTER",
    }
}

fn correlation_status_from_str(s: &str) -> Result<CorrelationStatus, PersistenceError> {
    match s {
        "PENDING" => Ok(CorrelationStatus::Pending),
        "COMPLETED" => Ok(CorrelationStatus::Completed),
        "FAILED" => Ok(CorrelationStatus::Failed),
        other => Err(PersistenceError::Serialization(format!("invalid correlation status: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ScheduledTaskRow {
    task_id: String,
    name: String,
    goal_description: String,
    status: String,
    trigger_prompt: String,
    origin_thought_id: String,
    defer_until: Option<String>,
    schedule_cron: Option<String>,
    last_triggered_at: Option<String>,
    deferral_count: i64,
    deferral_history: String,
    created_at: String,
}

impl ScheduledTaskRow {
    fn into_scheduled_task(self) -> Result<ScheduledTask, PersistenceError> {
        let deferral_history: Vec<DeferralHistoryEntry> = parse_json(&self.deferral_history)?;
        Ok(ScheduledTask {
            task_id: ScheduledTaskId(parse_uuid(&self.task_id)?),
            name: self.name,
            goal_description: self.goal_description,
            status: scheduled_task_status_from_str(&self.status)?,
            trigger_prompt: self.trigger_prompt,
            origin_thought_id: ThoughtId(parse_uuid(&self.origin_thought_id)?),
            defer_until: parse_opt_dt(self.defer_until)?,
            schedule_cron: self.schedule_cron,
            last_triggered_at: parse_opt_dt(self.last_triggered_at)?,
            deferral_count: self.deferral_count as u32,
            deferral_history,
            created_at: parse_dt(&self.created_at)?,
        })
    }
}

fn scheduled_task_status_from_str(s: &str) -> Result<ScheduledTaskStatus, PersistenceError> {
    match s {
        "PENDING" => Ok(ScheduledTaskStatus::Pending),
        "ACTIVE" => Ok(ScheduledTaskStatus::Active),
        "COMPLETE" => Ok(ScheduledTaskStatus::Complete),
        "CANCELLED" => Ok(ScheduledTaskStatus::Cancelled),
        other => Err(PersistenceError::Serialization(format!("invalid scheduled task status: {other}"))),
    }
}

#[async_trait::async_trait]
impl crate::domain::ports::PersistenceStore for SqliteStore {
    // -- Tasks ------------------------------------------------------

    async fn add_task(&self, task: Task) -> Result<(), PersistenceError> {
        let context_json = serde_json::to_string(&task.context).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        warn_if_large("context", task.id, &context_json);
        sqlx::query(
            "INSERT INTO tasks (id, description, priority, parent_task_id, context, outcome, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.to_string())
        .bind(&task.description)
        .bind(task.priority as i64)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&context_json)
        .bind(&task.outcome)
        .bind(task.status.as_str())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, PersistenceError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        row.map(TaskRow::into_task).transpose()
    }

    async fn task_exists(&self, id: TaskId) -> Result<bool, PersistenceError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, PersistenceError> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn get_pending_tasks_for_activation(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'PENDING' ORDER BY priority DESC, created_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn get_recent_completed_tasks(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'COMPLETED' ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn get_top_tasks(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks ORDER BY priority DESC, created_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn get_tasks_needing_seed_thought(&self, limit: usize) -> Result<Vec<Task>, PersistenceError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT t.* FROM tasks t
             WHERE t.status = 'ACTIVE'
               AND NOT EXISTS (
                 SELECT 1 FROM thoughts th
                 WHERE th.source_task_id = t.id
                   AND th.status NOT IN ('COMPLETED', 'FAILED', 'DEFERRED', 'REJECTED')
               )
             ORDER BY t.priority DESC, t.created_at ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn count_tasks(&self, status: Option<TaskStatus>) -> Result<u64, PersistenceError> {
        let count: (i64,) = match status {
            Some(status) => sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?,
            None => sqlx::query_as("SELECT COUNT(*) FROM tasks")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?,
        };
        Ok(count.0 as u64)
    }

    async fn delete_tasks_by_ids(&self, ids: &[TaskId]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(|e| PersistenceError::Backend(e.to_string()))?;
        for id in ids {
            sqlx::query("DELETE FROM thoughts WHERE source_task_id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
            sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    // -- Thoughts -----------------------------------------------------

    async fn add_thought(&self, thought: Thought) -> Result<(), PersistenceError> {
        let context_json = serde_json::to_string(&thought.context).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        warn_if_large("context", thought.id, &context_json);
        let ponder_notes_json = thought
            .ponder_notes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let final_action_json = thought
            .final_action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT INTO thoughts (id, source_task_id, parent_thought_id, thought_type, content, context,
                priority, round_number, ponder_count, ponder_notes, final_action, status, round_processed, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(thought.id.to_string())
        .bind(thought.source_task_id.to_string())
        .bind(thought.parent_thought_id.map(|id| id.to_string()))
        .bind(&thought.thought_type)
        .bind(&thought.content)
        .bind(&context_json)
        .bind(thought.priority as i64)
        .bind(thought.round_number as i64)
        .bind(thought.ponder_count as i64)
        .bind(&ponder_notes_json)
        .bind(&final_action_json)
        .bind(thought.status.as_str())
        .bind(thought.round_processed.map(|v| v as i64))
        .bind(thought.created_at.to_rfc3339())
        .bind(thought.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_thought(&self, id: ThoughtId) -> Result<Option<Thought>, PersistenceError> {
        let row: Option<ThoughtRow> = sqlx::query_as("SELECT * FROM thoughts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        row.map(ThoughtRow::into_thought).transpose()
    }

    async fn get_thoughts_by_task_id(&self, task_id: TaskId) -> Result<Vec<Thought>, PersistenceError> {
        let rows: Vec<ThoughtRow> = sqlx::query_as("SELECT * FROM thoughts WHERE source_task_id = ?")
            .bind(task_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(ThoughtRow::into_thought).collect()
    }

    async fn get_thoughts_by_status(&self, status: ThoughtStatus) -> Result<Vec<Thought>, PersistenceError> {
        let rows: Vec<ThoughtRow> = sqlx::query_as("SELECT * FROM thoughts WHERE status = ?")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(ThoughtRow::into_thought).collect()
    }

    async fn get_pending_thoughts_for_active_tasks(&self, limit: usize) -> Result<Vec<Thought>, PersistenceError> {
        let rows: Vec<ThoughtRow> = sqlx::query_as(
            "SELECT th.* FROM thoughts th
             INNER JOIN tasks t ON t.id = th.source_task_id
             WHERE th.status = 'PENDING' AND t.status = 'ACTIVE'
             ORDER BY t.priority DESC, th.priority DESC, th.created_at ASC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(ThoughtRow::into_thought).collect()
    }

    async fn update_thought_status(
        &self,
        id: ThoughtId,
        status: ThoughtStatus,
        final_action: Option<ActionSelectionResult>,
        round_processed: Option<u64>,
    ) -> Result<(), PersistenceError> {
        let final_action_json = final_action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        if let Some(json) = &final_action_json {
            sqlx::query(
                "UPDATE thoughts SET status = ?, final_action = ?, round_processed = COALESCE(?, round_processed), updated_at = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(json)
            .bind(round_processed.map(|v| v as i64))
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        } else {
            sqlx::query(
                "UPDATE thoughts SET status = ?, round_processed = COALESCE(?, round_processed), updated_at = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(round_processed.map(|v| v as i64))
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn count_thoughts(&self) -> Result<u64, PersistenceError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM thoughts WHERE status IN ('PENDING', 'PROCESSING')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(count.0 as u64)
    }

    async fn delete_thoughts_by_ids(&self, ids: &[ThoughtId]) -> Result<(), PersistenceError> {
        for id in ids {
            sqlx::query("DELETE FROM thoughts WHERE id = ?")
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn record_ponder(&self, id: ThoughtId, notes: Vec<String>) -> Result<(), PersistenceError> {
        let row: Option<(Option<String>, i64)> = sqlx::query_as("SELECT ponder_notes, ponder_count FROM thoughts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        let Some((existing_notes, count)) = row else { return Ok(()) };
        let mut all_notes: Vec<String> = existing_notes.map(|s| parse_json(&s)).transpose()?.unwrap_or_default();
        all_notes.extend(notes);
        let notes_json = serde_json::to_string(&all_notes).map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        sqlx::query("UPDATE thoughts SET ponder_notes = ?, ponder_count = ?, status = 'PENDING', updated_at = ? WHERE id = ?")
            .bind(&notes_json)
            .bind(count + 1)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    // -- Correlations -----------------------------------------------

    async fn add_correlation(&self, correlation: Correlation) -> Result<(), PersistenceError> {
        let request_json = serde_json::to_string(&correlation.request_data).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO correlations (correlation_id, service_type, handler_name, action_type, request_data, response_data, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(correlation.correlation_id.to_string())
        .bind(service_type_as_str(&correlation.service_type))
        .bind(&correlation.handler_name)
        .bind(&correlation.action_type)
        .bind(&request_json)
        .bind(correlation.response_data.as_ref().map(|v| v.to_string()))
        .bind(correlation_status_as_str(&correlation.status))
        .bind(correlation.created_at.to_rfc3339())
        .bind(correlation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn update_correlation(
        &self,
        id: CorrelationId,
        response: serde_json::Value,
        status: CorrelationStatus,
    ) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE correlations SET response_data = ?, status = ?, updated_at = ? WHERE correlation_id = ?")
            .bind(response.to_string())
            .bind(correlation_status_as_str(&status))
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_correlation(&self, id: CorrelationId) -> Result<Option<Correlation>, PersistenceError> {
        let row: Option<CorrelationRow> = sqlx::query_as("SELECT * FROM correlations WHERE correlation_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        row.map(CorrelationRow::into_correlation).transpose()
    }

    // -- Deferral report mapping --------------------------------------

    async fn save_deferral_report_mapping(
        &self,
        message_id: String,
        task_id: TaskId,
        thought_id: ThoughtId,
        package: Option<serde_json::Value>,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT OR REPLACE INTO deferral_reports (message_id, task_id, thought_id, package, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message_id)
        .bind(task_id.to_string())
        .bind(thought_id.to_string())
        .bind(package.as_ref().map(|v| v.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_deferral_report_context(
        &self,
        message_id: &str,
    ) -> Result<Option<DeferralReportContext>, PersistenceError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            message_id: String,
            task_id: String,
            thought_id: String,
            package: Option<String>,
            created_at: String,
        }
        let row: Option<Row> = sqlx::query_as("SELECT * FROM deferral_reports WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        row.map(|r| {
            Ok(DeferralReportContext {
                message_id: r.message_id,
                task_id: TaskId(parse_uuid(&r.task_id)?),
                thought_id: ThoughtId(parse_uuid(&r.thought_id)?),
                package: r.package.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| PersistenceError::Serialization(e.to_string()))?,
                created_at: parse_dt(&r.created_at)?,
            })
        })
        .transpose()
    }

    // -- Scheduled tasks -----------------------------------------------

    async fn add_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError> {
        let history_json = serde_json::to_string(&task.deferral_history).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO scheduled_tasks (task_id, name, goal_description, status, trigger_prompt, origin_thought_id,
                defer_until, schedule_cron, last_triggered_at, deferral_count, deferral_history, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.task_id.to_string())
        .bind(&task.name)
        .bind(&task.goal_description)
        .bind(task.status.as_str())
        .bind(&task.trigger_prompt)
        .bind(task.origin_thought_id.to_string())
        .bind(task.defer_until.map(|d| d.to_rfc3339()))
        .bind(&task.schedule_cron)
        .bind(task.last_triggered_at.map(|d| d.to_rfc3339()))
        .bind(task.deferral_count as i64)
        .bind(&history_json)
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_scheduled_task(&self, id: ScheduledTaskId) -> Result<Option<ScheduledTask>, PersistenceError> {
        let row: Option<ScheduledTaskRow> = sqlx::query_as("SELECT * FROM scheduled_tasks WHERE task_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        row.map(ScheduledTaskRow::into_scheduled_task).transpose()
    }

    async fn get_active_scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError> {
        let rows: Vec<ScheduledTaskRow> = sqlx::query_as(
            "SELECT * FROM scheduled_tasks WHERE status IN ('ACTIVE', 'PENDING')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        rows.into_iter().map(ScheduledTaskRow::into_scheduled_task).collect()
    }

    async fn update_scheduled_task(&self, task: ScheduledTask) -> Result<(), PersistenceError> {
        let history_json = serde_json::to_string(&task.deferral_history).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sqlx::query(
            "UPDATE scheduled_tasks SET name = ?, goal_description = ?, status = ?, trigger_prompt = ?,
                defer_until = ?, schedule_cron = ?, last_triggered_at = ?, deferral_count = ?, deferral_history = ?
             WHERE task_id = ?",
        )
        .bind(&task.name)
        .bind(&task.goal_description)
        .bind(task.status.as_str())
        .bind(&task.trigger_prompt)
        .bind(task.defer_until.map(|d| d.to_rfc3339()))
        .bind(&task.schedule_cron)
        .bind(task.last_triggered_at.map(|d| d.to_rfc3339()))
        .bind(task.deferral_count as i64)
        .bind(&history_json)
        .bind(task.task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_scheduled_task(&self, id: ScheduledTaskId) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM scheduled_tasks WHERE task_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        Ok(())
    }
}

fn correlation_status_as_str(s: &CorrelationStatus) -> &'static str {
    match s {
        CorrelationStatus::Pending => "PENDING",
        CorrelationStatus::Completed => "COMPLETED",
        CorrelationStatus::Failed => "FAILED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool};
    use crate::domain::models::TaskContext;
    use crate::domain::ports::PersistenceStore;

    async fn store() -> SqliteStore {
        SqliteStore::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn task_round_trips_through_sqlite() {
        let store = store().await;
        let mut task = Task::new("greet user", 5);
        task.context = TaskContext {
            channel_id: Some("general".to_string()),
            ..Default::default()
        };
        store.add_task(task.clone()).await.unwrap();

        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "greet user");
        assert_eq!(fetched.context.channel_id.as_deref(), Some("general"));
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn pending_thoughts_excludes_non_active_tasks() {
        let store = store().await;
        let mut active = Task::new("a", 5);
        active.status = TaskStatus::Active;
        let mut paused = Task::new("b", 9);
        paused.status = TaskStatus::Paused;
        store.add_task(active.clone()).await.unwrap();
        store.add_task(paused.clone()).await.unwrap();

        let th_active = Thought::new_seed(active.id, "x", TaskContext::default());
        let th_paused = Thought::new_seed(paused.id, "y", TaskContext::default());
        store.add_thought(th_active.clone()).await.unwrap();
        store.add_thought(th_paused).await.unwrap();

        let pending = store.get_pending_thoughts_for_active_tasks(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, th_active.id);
    }

    #[tokio::test]
    async fn pending_thoughts_ordered_by_thought_priority_within_same_task() {
        let store = store().await;
        let mut task = Task::new("t", 5);
        task.status = TaskStatus::Active;
        store.add_task(task.clone()).await.unwrap();

        let low = Thought::new_seed(task.id, "low", TaskContext::default()).with_priority(0);
        let high = Thought::new_seed(task.id, "high", TaskContext::default()).with_priority(10);
        store.add_thought(low.clone()).await.unwrap();
        store.add_thought(high.clone()).await.unwrap();

        let pending = store.get_pending_thoughts_for_active_tasks(10).await.unwrap();
        assert_eq!(pending[0].id, high.id);
        assert_eq!(pending[1].id, low.id);
    }

    #[tokio::test]
    async fn record_ponder_increments_count_and_requeues() {
        let store = store().await;
        let task = Task::new("t", 0);
        store.add_task(task.clone()).await.unwrap();
        let thought = Thought::new_seed(task.id, "c", TaskContext::default());
        store.add_thought(thought.clone()).await.unwrap();
        store.update_thought_status(thought.id, ThoughtStatus::Processing, None, Some(1)).await.unwrap();

        store.record_ponder(thought.id, vec!["why?".to_string()]).await.unwrap();

        let fetched = store.get_thought(thought.id).await.unwrap().unwrap();
        assert_eq!(fetched.ponder_count, 1);
        assert_eq!(fetched.status, ThoughtStatus::Pending);
        assert_eq!(fetched.ponder_notes.unwrap(), vec!["why?".to_string()]);
    }

    #[tokio::test]
    async fn deferral_report_round_trips() {
        let store = store().await;
        let task_id = TaskId::new();
        let thought_id = ThoughtId::new();
        store
            .save_deferral_report_mapping("msg-1".to_string(), task_id, thought_id, Some(serde_json::json!({"k": "v"})))
            .await
            .unwrap();

        let ctx = store.get_deferral_report_context("msg-1").await.unwrap().unwrap();
        assert_eq!(ctx.task_id, task_id);
        assert_eq!(ctx.thought_id, thought_id);
        assert_eq!(ctx.package, Some(serde_json::json!({"k": "v"})));
    }

    #[tokio::test]
    async fn scheduled_task_round_trips() {
        let store = store().await;
        let origin = ThoughtId::new();
        let task = ScheduledTask {
            task_id: ScheduledTaskId::new(),
            name: "daily-digest".to_string(),
            goal_description: "send the daily digest".to_string(),
            status: ScheduledTaskStatus::Active,
            trigger_prompt: "send digest".to_string(),
            origin_thought_id: origin,
            defer_until: None,
            schedule_cron: Some("0 9 * * *".to_string()),
            last_triggered_at: None,
            deferral_count: 0,
            deferral_history: Vec::new(),
            created_at: Utc::now(),
        };
        store.add_scheduled_task(task.clone()).await.unwrap();

        let fetched = store.get_scheduled_task(task.task_id).await.unwrap().unwrap();
        assert_eq!(fetched.schedule_cron.as_deref(), Some("0 9 * * *"));

        let active = store.get_active_scheduled_tasks().await.unwrap();
        assert_eq!(active.len(), 1);
    }
}
