//! Per-attempt step state machine.
//!
//! Each invocation drives exactly one attempt of one step:
//!
//! 1. **Write A**: issue a fresh idempotency key, mark the step RUNNING.
//! 2. **Probe** the result table for that key. A hit means the attempt
//!    already committed, so the step is marked COMPLETED without
//!    re-running the task or the action. Under the fresh-key protocol
//!    this never fires in normal flow; it is kept as a guard for the
//!    commit-boundary crash window.
//! 3. Run the simulated task.
//! 4. **Write B** on success: result insert + step completion + optional
//!    action dispatch, all in one transaction.
//! 5. On failure (task, action, or a transient store error during
//!    Write B): schedule a retry while budget remains, else fail the
//!    step permanently.
//!
//! Crash analysis: a crash before Write A commits leaves the step
//! PENDING with no key, so the next attempt starts clean. A crash after
//! Write A but before Write B leaves it RUNNING with a key but no
//! result; recovery re-executes with a fresh key and the stale key is
//! discarded. A crash after Write B leaves it COMPLETED and the worker
//! skips it. There is no window where a step is COMPLETED without its
//! StepResult, or where an action fired without its step completing.

use flowline_types::error::RepositoryError;
use flowline_types::workflow::{StepConfig, StepState};
use uuid::Uuid;

use crate::repository::{ActionDispatch, WorkflowRepository};
use crate::task;

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step reached COMPLETED.
    Completed,
    /// The attempt failed with retry budget remaining; invoke again.
    Retry,
    /// The attempt failed with the budget exhausted; the step is FAILED.
    PermanentFailure,
}

/// Drive one attempt of `step`. The caller passes the current row (so
/// `retry_count` is fresh) and repeats while `Retry` comes back.
pub async fn execute_step<R: WorkflowRepository>(
    repo: &R,
    step: &StepState,
    config: &StepConfig,
    order_id: Option<Uuid>,
) -> Result<StepOutcome, RepositoryError> {
    // Write A: the key must be durable before the task runs.
    let idempotency_key = Uuid::now_v7().to_string();
    repo.begin_step_attempt(&step.id, &idempotency_key).await?;

    if repo.find_step_result(&idempotency_key).await?.is_some() {
        tracing::info!(
            step = %step.step_id,
            key = %idempotency_key,
            "found existing result for idempotency key, skipping execution"
        );
        repo.mark_step_completed(&step.id).await?;
        return Ok(StepOutcome::Completed);
    }

    let failure = match task::execute_task(&step.step_id, config).await {
        Ok(result_data) => {
            let dispatch = match (&config.action, order_id) {
                (Some(action), Some(order_id)) => Some(ActionDispatch {
                    action: action.clone(),
                    order_id,
                }),
                _ => None,
            };
            match repo
                .complete_step(&step.id, &idempotency_key, Some(&result_data), dispatch.as_ref())
                .await
            {
                Ok(()) => {
                    tracing::info!(step = %step.step_id, "step completed");
                    return Ok(StepOutcome::Completed);
                }
                Err(e) => e.to_string(),
            }
        }
        Err(e) => e.to_string(),
    };

    if step.retry_count < step.max_retries {
        repo.schedule_step_retry(&step.id, step.retry_count + 1, &failure)
            .await?;
        tracing::info!(
            step = %step.step_id,
            attempt = step.retry_count + 1,
            of = step.max_retries + 1,
            "attempt failed, will retry"
        );
        Ok(StepOutcome::Retry)
    } else {
        repo.mark_step_failed(&step.id, &failure).await?;
        tracing::warn!(
            step = %step.step_id,
            attempts = step.retry_count + 1,
            error = %failure,
            "step permanently failed"
        );
        Ok(StepOutcome::PermanentFailure)
    }
}
