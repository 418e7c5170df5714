//! Worker lifecycle: ensures exactly one live worker per run id.

use std::sync::Arc;

use dashmap::DashMap;
use flowline_types::workflow::RunStatus;
use uuid::Uuid;

use crate::repository::WorkflowRepository;

use super::worker::RunWorker;

/// Accepts "start this run" requests and dispatches background workers.
///
/// Submission is idempotent: a second submission while a worker is live
/// for the same run id is a no-op. The caller returns immediately; the
/// worker runs in its own tokio task.
pub struct Supervisor<R> {
    repo: Arc<R>,
    live: Arc<DashMap<Uuid, ()>>,
}

impl<R: WorkflowRepository + 'static> Supervisor<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            live: Arc::new(DashMap::new()),
        }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    /// Whether a worker is currently live for the run.
    pub fn is_live(&self, run_id: &Uuid) -> bool {
        self.live.contains_key(run_id)
    }

    /// Dispatch a background worker for the run.
    ///
    /// Worker errors and panics are both caught here; either way the run
    /// is marked FAILED so it is never left RUNNING while the process is
    /// up.
    pub fn submit(&self, run_id: Uuid) {
        if self.live.insert(run_id, ()).is_some() {
            tracing::debug!(run_id = %run_id, "worker already live, ignoring submission");
            return;
        }

        let repo = Arc::clone(&self.repo);
        let live = Arc::clone(&self.live);

        tokio::spawn(async move {
            // Inner spawn so a panic surfaces as a JoinError instead of
            // silently killing the run.
            let handle = tokio::spawn(RunWorker::new(Arc::clone(&repo), run_id).run());

            let failure = match handle.await {
                Ok(Ok(())) => None,
                Ok(Err(worker_err)) => Some(worker_err.to_string()),
                Err(join_err) => Some(format!("worker crashed: {join_err}")),
            };

            if let Some(error) = failure {
                tracing::error!(
                    run_id = %run_id,
                    error = %error,
                    "worker failed, marking run failed"
                );
                if let Err(e) = repo.finish_run(&run_id, RunStatus::Failed).await {
                    tracing::error!(
                        run_id = %run_id,
                        error = %e,
                        "failed to record run failure"
                    );
                }
            }

            live.remove(&run_id);
        });
    }
}
