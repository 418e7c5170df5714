//! Executes one run end-to-end, one step at a time.

use std::collections::HashMap;
use std::sync::Arc;

use flowline_types::error::RepositoryError;
use flowline_types::workflow::{RunStatus, StepConfig, StepStatus};
use uuid::Uuid;

use crate::repository::WorkflowRepository;

use super::executor::{StepOutcome, execute_step};

/// Errors a worker can hit outside normal step failure accounting.
///
/// These are worker-internal: the supervisor catches them and marks the
/// run FAILED so it is never left RUNNING by a returning worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("run not found: {0}")]
    RunNotFound(Uuid),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("step row not found: {0}")]
    StepNotFound(Uuid),

    #[error("step '{0}' is missing from the workflow definition")]
    StepNotInDefinition(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One logical worker per run. Owns no state beyond the repository
/// handle and its run id; it never touches another run's rows.
pub struct RunWorker<R> {
    repo: Arc<R>,
    run_id: Uuid,
}

impl<R: WorkflowRepository> RunWorker<R> {
    pub fn new(repo: Arc<R>, run_id: Uuid) -> Self {
        Self { repo, run_id }
    }

    /// Drive the run to a terminal status.
    ///
    /// Steps already COMPLETED are skipped, so a worker resumed after a
    /// crash continues exactly where the previous process stopped. Steps
    /// found PENDING or RUNNING are both executed: a RUNNING step is an
    /// interrupted attempt, and re-execution under a fresh idempotency
    /// key is not a retry (`retry_count` is untouched).
    pub async fn run(self) -> Result<(), WorkerError> {
        let run = self
            .repo
            .get_run(&self.run_id)
            .await?
            .ok_or(WorkerError::RunNotFound(self.run_id))?;

        if run.status.is_terminal() {
            tracing::debug!(run_id = %self.run_id, "run already terminal, nothing to do");
            return Ok(());
        }

        let workflow = self
            .repo
            .get_workflow(&run.workflow_id)
            .await?
            .ok_or(WorkerError::WorkflowNotFound(run.workflow_id))?;

        // Configs are looked up by step ID, not array position: the
        // persisted step order is the planner's, not the definition's.
        let configs: HashMap<&str, &StepConfig> = workflow
            .definition
            .steps
            .iter()
            .map(|s| (s.id.as_str(), &s.config))
            .collect();

        self.repo.mark_run_running(&self.run_id).await?;
        tracing::info!(
            run_id = %self.run_id,
            workflow = %workflow.name,
            "run started"
        );

        let steps = self.repo.list_steps(&self.run_id).await?;
        let mut run_failed = false;

        for step in &steps {
            if step.status == StepStatus::Completed {
                tracing::debug!(
                    run_id = %self.run_id,
                    step = %step.step_id,
                    "step already completed, skipping"
                );
                continue;
            }

            let config = *configs
                .get(step.step_id.as_str())
                .ok_or_else(|| WorkerError::StepNotInDefinition(step.step_id.clone()))?;

            loop {
                // Re-fetch so the attempt sees the current retry_count.
                let current = self
                    .repo
                    .get_step(&step.id)
                    .await?
                    .ok_or(WorkerError::StepNotFound(step.id))?;

                match execute_step(self.repo.as_ref(), &current, config, run.order_id).await? {
                    StepOutcome::Completed => break,
                    StepOutcome::Retry => continue,
                    StepOutcome::PermanentFailure => {
                        run_failed = true;
                        break;
                    }
                }
            }

            if run_failed {
                break;
            }
        }

        let final_status = if run_failed {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.repo.finish_run(&self.run_id, final_status).await?;
        tracing::info!(
            run_id = %self.run_id,
            status = final_status.as_str(),
            "run finished"
        );
        Ok(())
    }
}
