//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `flowline-core` using sqlx with
//! the split read/write pool. Workflow definitions are stored as JSON
//! blobs; runs, steps, and step results track execution state for the
//! durability protocol.
//!
//! The two protocol writes live here: `begin_step_attempt` (Write A) is
//! a single auto-committed UPDATE, and `complete_step` (Write B) is an
//! explicit transaction spanning the StepResult insert, the step status
//! update, and the registered action, so that all of them become visible
//! together or not at all.

use chrono::{DateTime, Utc};
use flowline_core::repository::workflow::{ActionDispatch, CompleteStepError, WorkflowRepository};
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{
    Run, RunStatus, StepDefinition, StepResult, StepState, StepStatus, Workflow,
};
use sqlx::Row;
use uuid::Uuid;

use crate::actions::ActionRegistry;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
    actions: ActionRegistry,
}

impl SqliteWorkflowRepository {
    /// Create a repository with the built-in action registry.
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            actions: ActionRegistry::builtin(),
        }
    }

    /// Create a repository with a custom action registry.
    pub fn with_actions(pool: DatabasePool, actions: ActionRegistry) -> Self {
        Self { pool, actions }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    name: String,
    definition: String,
    created_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            definition: row.try_get("definition")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            definition: serde_json::from_str(&self.definition).map_err(|e| {
                RepositoryError::Query(format!("invalid workflow definition JSON: {e}"))
            })?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct RunRow {
    id: String,
    workflow_id: String,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    business_object_id: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            business_object_id: row.try_get("business_object_id")?,
        })
    }

    fn into_run(self) -> Result<Run, RepositoryError> {
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| RepositoryError::Query(format!("invalid run status: {}", self.status)))?;
        Ok(Run {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            status,
            order_id: self
                .business_object_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct StepRow {
    id: String,
    run_id: String,
    step_id: String,
    step_index: i64,
    status: String,
    idempotency_key: Option<String>,
    retry_count: i64,
    max_retries: i64,
    started_at: Option<String>,
    completed_at: Option<String>,
    error_message: Option<String>,
    created_at: String,
}

impl StepRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            step_id: row.try_get("step_id")?,
            step_index: row.try_get("step_index")?,
            status: row.try_get("status")?,
            idempotency_key: row.try_get("idempotency_key")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_step(self) -> Result<StepState, RepositoryError> {
        let status = StepStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Query(format!("invalid step status: {}", self.status))
        })?;
        Ok(StepState {
            id: parse_uuid(&self.id)?,
            run_id: parse_uuid(&self.run_id)?,
            step_id: self.step_id,
            step_index: self.step_index as u32,
            status,
            idempotency_key: self.idempotency_key,
            retry_count: self.retry_count as u32,
            max_retries: self.max_retries as u32,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            error_message: self.error_message,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(&workflow.definition)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;

        sqlx::query("INSERT INTO workflows (id, name, definition, created_at) VALUES (?, ?, ?, ?)")
            .bind(workflow.id.to_string())
            .bind(&workflow.name)
            .bind(&definition_json)
            .bind(format_datetime(&workflow.created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowRow::from_row(row).map_err(query_err)?;
            workflows.push(r.into_workflow()?);
        }
        Ok(workflows)
    }

    async fn create_run(
        &self,
        run: &Run,
        planned: &[StepDefinition],
    ) -> Result<Vec<StepState>, RepositoryError> {
        let now = Utc::now();
        let now_str = format_datetime(&now);

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO runs (id, workflow_id, status, started_at, completed_at, created_at, business_object_id) \
             VALUES (?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.status.as_str())
        .bind(format_datetime(&run.created_at))
        .bind(run.order_id.map(|id| id.to_string()))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        let mut steps = Vec::with_capacity(planned.len());
        for (index, def) in planned.iter().enumerate() {
            let step = StepState {
                id: Uuid::now_v7(),
                run_id: run.id,
                step_id: def.id.clone(),
                step_index: index as u32,
                status: StepStatus::Pending,
                idempotency_key: None,
                retry_count: 0,
                max_retries: def.config.max_retries,
                started_at: None,
                completed_at: None,
                error_message: None,
                created_at: now,
            };

            sqlx::query(
                "INSERT INTO steps \
                 (id, run_id, step_id, step_index, status, idempotency_key, \
                  retry_count, max_retries, started_at, completed_at, error_message, created_at) \
                 VALUES (?, ?, ?, ?, ?, NULL, 0, ?, NULL, NULL, NULL, ?)",
            )
            .bind(step.id.to_string())
            .bind(run.id.to_string())
            .bind(&step.step_id)
            .bind(index as i64)
            .bind(step.status.as_str())
            .bind(step.max_retries as i64)
            .bind(&now_str)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

            steps.push(step);
        }

        tx.commit().await.map_err(query_err)?;
        Ok(steps)
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = RunRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_run()?))
            }
            None => Ok(None),
        }
    }

    async fn list_runs(&self) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY created_at DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = RunRow::from_row(row).map_err(query_err)?;
            runs.push(r.into_run()?);
        }
        Ok(runs)
    }

    async fn list_running_runs(&self) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM runs WHERE status = 'running' ORDER BY created_at ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = RunRow::from_row(row).map_err(query_err)?;
            runs.push(r.into_run()?);
        }
        Ok(runs)
    }

    async fn mark_run_running(&self, run_id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE runs SET status = 'running', started_at = COALESCE(started_at, ?) WHERE id = ?",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn finish_run(&self, run_id: &Uuid, status: RunStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE runs SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_datetime(&Utc::now()))
            .bind(run_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_steps(&self, run_id: &Uuid) -> Result<Vec<StepState>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM steps WHERE run_id = ? ORDER BY step_index ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut steps = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepRow::from_row(row).map_err(query_err)?;
            steps.push(r.into_step()?);
        }
        Ok(steps)
    }

    async fn get_step(&self, step_uuid: &Uuid) -> Result<Option<StepState>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM steps WHERE id = ?")
            .bind(step_uuid.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let r = StepRow::from_row(&row).map_err(query_err)?;
                Ok(Some(r.into_step()?))
            }
            None => Ok(None),
        }
    }

    async fn begin_step_attempt(
        &self,
        step_uuid: &Uuid,
        idempotency_key: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE steps SET status = 'running', idempotency_key = ?, \
             started_at = COALESCE(started_at, ?) WHERE id = ?",
        )
        .bind(idempotency_key)
        .bind(format_datetime(&Utc::now()))
        .bind(step_uuid.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_step_result(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<StepResult>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM step_results WHERE idempotency_key = ?")
            .bind(idempotency_key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let result_data: Option<String> = row.try_get("result_data").map_err(query_err)?;
                Ok(Some(StepResult {
                    idempotency_key: row.try_get("idempotency_key").map_err(query_err)?,
                    step_id: parse_uuid(&row.try_get::<String, _>("step_id").map_err(query_err)?)?,
                    result_data: result_data
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()
                        .map_err(|e| {
                            RepositoryError::Query(format!("invalid result_data JSON: {e}"))
                        })?,
                    created_at: parse_datetime(
                        &row.try_get::<String, _>("created_at").map_err(query_err)?,
                    )?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn mark_step_completed(&self, step_uuid: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE steps SET status = 'completed', completed_at = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(step_uuid.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn complete_step(
        &self,
        step_uuid: &Uuid,
        idempotency_key: &str,
        result_data: Option<&serde_json::Value>,
        action: Option<&ActionDispatch>,
    ) -> Result<(), CompleteStepError> {
        let now = format_datetime(&Utc::now());
        let result_json = result_data.map(|v| v.to_string());

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO step_results (idempotency_key, step_id, result_data, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(idempotency_key)
        .bind(step_uuid.to_string())
        .bind(&result_json)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query("UPDATE steps SET status = 'completed', completed_at = ? WHERE id = ?")
            .bind(&now)
            .bind(step_uuid.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        if let Some(dispatch) = action {
            if let Some(func) = self.actions.get(&dispatch.action) {
                // An action error drops the transaction, rolling back the
                // result insert and the status update with it.
                func(&mut *tx, dispatch.order_id)
                    .await
                    .map_err(|e| CompleteStepError::Action(e.to_string()))?;
            } else {
                tracing::debug!(action = %dispatch.action, "unknown action, skipping dispatch");
            }
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn schedule_step_retry(
        &self,
        step_uuid: &Uuid,
        new_retry_count: u32,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE steps SET status = 'pending', idempotency_key = NULL, \
             retry_count = ?, error_message = ? WHERE id = ?",
        )
        .bind(new_retry_count as i64)
        .bind(error_message)
        .bind(step_uuid.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn mark_step_failed(
        &self,
        step_uuid: &Uuid,
        error_message: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE steps SET status = 'failed', error_message = ?, completed_at = ? WHERE id = ?",
        )
        .bind(error_message)
        .bind(format_datetime(&Utc::now()))
        .bind(step_uuid.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::workflow::{StepConfig, WorkflowDefinition};

    async fn test_repo() -> (SqliteWorkflowRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteWorkflowRepository::new(pool), dir)
    }

    fn sample_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "sample".to_string(),
            steps: vec![
                StepDefinition {
                    id: "a".to_string(),
                    step_type: "task".to_string(),
                    depends_on: vec![],
                    config: StepConfig {
                        max_retries: 1,
                        ..StepConfig::default()
                    },
                },
                StepDefinition {
                    id: "b".to_string(),
                    step_type: "task".to_string(),
                    depends_on: vec!["a".to_string()],
                    config: StepConfig::default(),
                },
            ],
        }
    }

    fn sample_workflow() -> Workflow {
        let definition = sample_definition();
        Workflow {
            id: Uuid::now_v7(),
            name: definition.name.clone(),
            definition,
            created_at: Utc::now(),
        }
    }

    fn pending_run(workflow_id: Uuid, order_id: Option<Uuid>) -> Run {
        Run {
            id: Uuid::now_v7(),
            workflow_id,
            status: RunStatus::Pending,
            order_id,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_workflow_roundtrip() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();

        let loaded = repo.get_workflow(&workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, workflow.id);
        assert_eq!(loaded.name, "sample");
        assert_eq!(loaded.definition.steps.len(), 2);
        assert_eq!(loaded.definition.steps[1].depends_on, vec!["a"]);

        assert!(repo.get_workflow(&Uuid::now_v7()).await.unwrap().is_none());
        assert_eq!(repo.list_workflows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_run_writes_indexed_pending_steps() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();

        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();

        assert_eq!(steps.len(), 2);
        let loaded = repo.list_steps(&run.id).await.unwrap();
        assert_eq!(loaded.len(), 2);
        for (index, step) in loaded.iter().enumerate() {
            assert_eq!(step.step_index as usize, index);
            assert_eq!(step.status, StepStatus::Pending);
            assert!(step.idempotency_key.is_none());
            assert_eq!(step.retry_count, 0);
        }
        assert_eq!(loaded[0].step_id, "a");
        assert_eq!(loaded[0].max_retries, 1);
        assert_eq!(loaded[1].step_id, "b");
        assert_eq!(loaded[1].max_retries, 0);

        let loaded_run = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded_run.status, RunStatus::Pending);
        assert!(loaded_run.started_at.is_none());
    }

    #[tokio::test]
    async fn test_begin_step_attempt_preserves_started_at() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();
        let step = &steps[0];

        repo.begin_step_attempt(&step.id, "key-1").await.unwrap();
        let first = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(first.status, StepStatus::Running);
        assert_eq!(first.idempotency_key.as_deref(), Some("key-1"));
        let original_started = first.started_at.unwrap();

        // A second attempt rotates the key but keeps the original start.
        repo.begin_step_attempt(&step.id, "key-2").await.unwrap();
        let second = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(second.idempotency_key.as_deref(), Some("key-2"));
        assert_eq!(second.started_at.unwrap(), original_started);
    }

    #[tokio::test]
    async fn test_complete_step_inserts_result_and_completes() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();
        let step = &steps[0];

        repo.begin_step_attempt(&step.id, "key-1").await.unwrap();
        let payload = serde_json::json!({"status": "success"});
        repo.complete_step(&step.id, "key-1", Some(&payload), None)
            .await
            .unwrap();

        let loaded = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StepStatus::Completed);
        assert!(loaded.completed_at.is_some());

        let result = repo.find_step_result("key-1").await.unwrap().unwrap();
        assert_eq!(result.step_id, step.id);
        assert_eq!(result.result_data.unwrap()["status"], "success");

        assert!(repo.find_step_result("key-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_step_action_failure_rolls_back_everything() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();
        let step = &steps[0];
        repo.begin_step_attempt(&step.id, "key-1").await.unwrap();

        // charge_payment against a missing order fails its precondition.
        let dispatch = ActionDispatch {
            action: "charge_payment".to_string(),
            order_id: Uuid::now_v7(),
        };
        let err = repo
            .complete_step(&step.id, "key-1", None, Some(&dispatch))
            .await
            .unwrap_err();
        assert!(matches!(err, CompleteStepError::Action(_)));
        assert!(err.to_string().contains("not found"));

        // Nothing from the transaction is visible.
        let loaded = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StepStatus::Running);
        assert!(loaded.completed_at.is_none());
        assert!(repo.find_step_result("key-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_step_unknown_action_is_noop() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();
        let step = &steps[0];
        repo.begin_step_attempt(&step.id, "key-1").await.unwrap();

        let dispatch = ActionDispatch {
            action: "frobnicate".to_string(),
            order_id: Uuid::now_v7(),
        };
        repo.complete_step(&step.id, "key-1", None, Some(&dispatch))
            .await
            .unwrap();

        let loaded = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_schedule_retry_clears_key_and_bumps_count() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();
        let step = &steps[0];
        repo.begin_step_attempt(&step.id, "key-1").await.unwrap();

        repo.schedule_step_retry(&step.id, 1, "task 'a' failed")
            .await
            .unwrap();

        let loaded = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StepStatus::Pending);
        assert!(loaded.idempotency_key.is_none());
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.error_message.as_deref(), Some("task 'a' failed"));
    }

    #[tokio::test]
    async fn test_mark_step_failed() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        let steps = repo
            .create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();
        let step = &steps[0];

        repo.mark_step_failed(&step.id, "boom").await.unwrap();
        let loaded = repo.get_step(&step.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, StepStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("boom"));
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_run_status_transitions() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();
        let run = pending_run(workflow.id, None);
        repo.create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();

        repo.mark_run_running(&run.id).await.unwrap();
        let running = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(running.status, RunStatus::Running);
        let started = running.started_at.unwrap();

        // Marking running again (recovery) keeps the original start time.
        repo.mark_run_running(&run.id).await.unwrap();
        let again = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(again.started_at.unwrap(), started);

        assert_eq!(repo.list_running_runs().await.unwrap().len(), 1);

        repo.finish_run(&run.id, RunStatus::Completed).await.unwrap();
        let finished = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(finished.status, RunStatus::Completed);
        assert!(finished.completed_at.is_some());
        assert!(repo.list_running_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_rows_report_not_found() {
        let (repo, _dir) = test_repo().await;
        let ghost = Uuid::now_v7();

        assert!(matches!(
            repo.mark_run_running(&ghost).await.unwrap_err(),
            RepositoryError::NotFound
        ));
        assert!(matches!(
            repo.begin_step_attempt(&ghost, "key").await.unwrap_err(),
            RepositoryError::NotFound
        ));
        assert!(matches!(
            repo.mark_step_failed(&ghost, "err").await.unwrap_err(),
            RepositoryError::NotFound
        ));
        assert!(repo.get_run(&ghost).await.unwrap().is_none());
        assert!(repo.get_step(&ghost).await.unwrap().is_none());
        assert!(repo.list_steps(&ghost).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_with_order_reference() {
        let (repo, _dir) = test_repo().await;
        let workflow = sample_workflow();
        repo.create_workflow(&workflow).await.unwrap();

        // The FK requires a real order row.
        let order_id = Uuid::now_v7();
        let now = format_datetime(&Utc::now());
        sqlx::query(
            "INSERT INTO business_objects (id, status, amount, created_at, updated_at) \
             VALUES (?, 'pending', 10.0, ?, ?)",
        )
        .bind(order_id.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&repo.pool.writer)
        .await
        .unwrap();

        let run = pending_run(workflow.id, Some(order_id));
        repo.create_run(&run, &workflow.definition.steps)
            .await
            .unwrap();

        let loaded = repo.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.order_id, Some(order_id));
    }
}
