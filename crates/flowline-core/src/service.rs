//! The operations Flowline exposes to its hosting surface (HTTP, CLI).
//!
//! Thin façade over the repository and supervisor: validation and
//! planning happen here, before anything is persisted, so a rejected
//! definition leaves no rows behind.

use std::sync::Arc;

use chrono::Utc;
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{Run, RunStatus, StepState, Workflow, WorkflowDefinition};
use uuid::Uuid;

use crate::engine::Supervisor;
use crate::planner::{self, PlanError};
use crate::repository::WorkflowRepository;

/// Errors surfaced by the service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct WorkflowService<R> {
    repo: Arc<R>,
    supervisor: Arc<Supervisor<R>>,
}

impl<R: WorkflowRepository + 'static> WorkflowService<R> {
    pub fn new(repo: Arc<R>, supervisor: Arc<Supervisor<R>>) -> Self {
        Self { repo, supervisor }
    }

    /// Validate a definition (structure, numeric ranges, acyclicity) and
    /// persist it verbatim.
    pub async fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<Workflow, ServiceError> {
        planner::validate_definition(&definition)?;
        planner::plan(&definition.steps)?;

        let workflow = Workflow {
            id: Uuid::now_v7(),
            name: definition.name.clone(),
            definition,
            created_at: Utc::now(),
        };
        self.repo.create_workflow(&workflow).await?;
        tracing::info!(
            workflow_id = %workflow.id,
            name = %workflow.name,
            steps = workflow.definition.steps.len(),
            "workflow created"
        );
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: Uuid) -> Result<Workflow, ServiceError> {
        self.repo
            .get_workflow(&id)
            .await?
            .ok_or(ServiceError::WorkflowNotFound(id))
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, ServiceError> {
        Ok(self.repo.list_workflows().await?)
    }

    /// Create a run with its planner-ordered steps (one transaction) and
    /// dispatch a background worker. Returns immediately.
    pub async fn start_run(
        &self,
        workflow_id: Uuid,
        order_id: Option<Uuid>,
    ) -> Result<(Run, Vec<StepState>), ServiceError> {
        let workflow = self.get_workflow(workflow_id).await?;
        let planned = planner::plan(&workflow.definition.steps)?;

        let run = Run {
            id: Uuid::now_v7(),
            workflow_id,
            status: RunStatus::Pending,
            order_id,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        let steps = self.repo.create_run(&run, &planned).await?;
        self.supervisor.submit(run.id);

        tracing::info!(
            run_id = %run.id,
            workflow_id = %workflow_id,
            steps = steps.len(),
            "run submitted"
        );
        Ok((run, steps))
    }

    /// Read-only snapshot of a run and its steps in execution order.
    pub async fn get_run(&self, run_id: Uuid) -> Result<(Run, Vec<StepState>), ServiceError> {
        let run = self
            .repo
            .get_run(&run_id)
            .await?
            .ok_or(ServiceError::RunNotFound(run_id))?;
        let steps = self.repo.list_steps(&run_id).await?;
        Ok((run, steps))
    }

    pub async fn list_runs(&self) -> Result<Vec<Run>, ServiceError> {
        Ok(self.repo.list_runs().await?)
    }
}
