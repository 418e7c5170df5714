//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions, runs, steps,
//! and step results, including the two durability-critical writes of the
//! step protocol:
//!
//! - **Write A** (`begin_step_attempt`): persist the attempt's fresh
//!   idempotency key and mark the step running, committed before the
//!   task executes.
//! - **Write B** (`complete_step`): a single transaction inserting the
//!   step result, marking the step completed, and dispatching the
//!   registered action (if any). Either all three are visible or none.
//!
//! Uses native async fn in traits (RPITIT), no async_trait macro.

use flowline_types::error::RepositoryError;
use flowline_types::workflow::{
    Run, RunStatus, StepDefinition, StepResult, StepState, Workflow,
};
use uuid::Uuid;

/// Action to dispatch inside the step-completion transaction.
#[derive(Debug, Clone)]
pub struct ActionDispatch {
    /// Registered action name from the step's config.
    pub action: String,
    /// The order the owning run references.
    pub order_id: Uuid,
}

/// Error from the atomic step-completion write.
///
/// Both variants are treated as a failed attempt by the executor (they
/// enter retry accounting); the split preserves the action's own message
/// as the step's `error_message`.
#[derive(Debug, thiserror::Error)]
pub enum CompleteStepError {
    /// The action function rejected the transition; the whole
    /// transaction was rolled back.
    #[error("{0}")]
    Action(String),

    /// The store itself failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Repository trait for workflow persistence and the step protocol.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Insert a workflow record (definition stored verbatim).
    fn create_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List all workflows, newest first.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a run and its planned steps in a single transaction.
    ///
    /// Steps are written with `step_index` following the order of
    /// `planned`, status PENDING, and `max_retries` copied from each
    /// step's config. Returns the created step rows in index order.
    fn create_run(
        &self,
        run: &Run,
        planned: &[StepDefinition],
    ) -> impl std::future::Future<Output = Result<Vec<StepState>, RepositoryError>> + Send;

    /// Get a run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// List all runs, newest first.
    fn list_runs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// List runs left in RUNNING status (crash recovery).
    fn list_running_runs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Set the run RUNNING, recording `started_at` only if still null.
    fn mark_run_running(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record the run's terminal status and `completed_at`.
    fn finish_run(
        &self,
        run_id: &Uuid,
        status: RunStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// List a run's steps ordered by `step_index` ascending.
    fn list_steps(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepState>, RepositoryError>> + Send;

    /// Get a single step row by its UUID.
    fn get_step(
        &self,
        step_uuid: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<StepState>, RepositoryError>> + Send;

    /// Write A: persist the attempt's idempotency key, set the step
    /// RUNNING, and record `started_at` only if still null.
    fn begin_step_attempt(
        &self,
        step_uuid: &Uuid,
        idempotency_key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Probe the result table for an idempotency key.
    fn find_step_result(
        &self,
        idempotency_key: &str,
    ) -> impl std::future::Future<Output = Result<Option<StepResult>, RepositoryError>> + Send;

    /// Mark a step COMPLETED without inserting a result row (the probe
    /// found an already-committed result for the current key).
    fn mark_step_completed(
        &self,
        step_uuid: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Write B: in one transaction, insert the StepResult keyed by
    /// `idempotency_key`, mark the step COMPLETED, and dispatch `action`
    /// if it names a registered function. Any failure rolls back the
    /// whole transaction.
    fn complete_step(
        &self,
        step_uuid: &Uuid,
        idempotency_key: &str,
        result_data: Option<&serde_json::Value>,
        action: Option<&ActionDispatch>,
    ) -> impl std::future::Future<Output = Result<(), CompleteStepError>> + Send;

    /// Record a failed attempt with retry budget remaining: bump
    /// `retry_count`, clear the idempotency key, set the step back to
    /// PENDING, and store the error message.
    fn schedule_step_retry(
        &self,
        step_uuid: &Uuid,
        new_retry_count: u32,
        error_message: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record a permanently failed step: status FAILED, `completed_at`,
    /// and the error message.
    fn mark_step_failed(
        &self,
        step_uuid: &Uuid,
        error_message: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
