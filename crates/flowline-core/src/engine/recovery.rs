//! Startup recovery: resume runs left RUNNING by a previous process.
//!
//! Runs exactly once, before the external surface opens. The resumed
//! workers use the same logic as fresh starts: completed steps are
//! skipped, interrupted steps re-execute under fresh idempotency keys.

use flowline_types::error::RepositoryError;

use crate::repository::WorkflowRepository;

use super::supervisor::Supervisor;

/// Scan the store for runs in RUNNING status and resubmit each to the
/// supervisor. Returns once all submissions are accepted (not
/// completed) with the number of resumed runs.
pub async fn recover_interrupted_runs<R: WorkflowRepository + 'static>(
    supervisor: &Supervisor<R>,
) -> Result<usize, RepositoryError> {
    let running = supervisor.repo().list_running_runs().await?;
    if running.is_empty() {
        tracing::info!("recovery: no interrupted runs found");
        return Ok(0);
    }

    tracing::info!(count = running.len(), "recovery: found interrupted runs");
    for run in &running {
        tracing::info!(run_id = %run.id, "recovery: resuming run");
        supervisor.submit(run.id);
    }
    Ok(running.len())
}
