//! The simulated step task: sleep for the configured duration, then
//! succeed or fail based on `fail_probability`.
//!
//! Deterministic at the boundaries: 0.0 always succeeds, 1.0 always
//! fails, which is what the test suite relies on.

use std::time::Duration;

use flowline_types::workflow::StepConfig;
use rand::Rng;
use serde_json::json;
use thiserror::Error;

/// Raised when the simulated task fails its probability roll.
#[derive(Debug, Error)]
#[error("task '{step_id}' failed (fail_probability={fail_probability})")]
pub struct TaskError {
    pub step_id: String,
    pub fail_probability: f64,
}

/// Execute one simulated task attempt.
///
/// Suspends the caller for `duration_seconds`, then rolls against
/// `fail_probability`. Returns an opaque result payload on success.
pub async fn execute_task(
    step_id: &str,
    config: &StepConfig,
) -> Result<serde_json::Value, TaskError> {
    tracing::debug!(
        step_id,
        duration_seconds = config.duration_seconds,
        "executing task"
    );

    let duration = Duration::try_from_secs_f64(config.duration_seconds).unwrap_or_default();
    tokio::time::sleep(duration).await;

    // gen_range samples [0.0, 1.0), so 0.0 never fails and 1.0 always does.
    let roll: f64 = rand::thread_rng().gen_range(0.0..1.0);
    if roll < config.fail_probability {
        tracing::warn!(
            step_id,
            fail_probability = config.fail_probability,
            "task failed"
        );
        return Err(TaskError {
            step_id: step_id.to_string(),
            fail_probability: config.fail_probability,
        });
    }

    tracing::debug!(step_id, "task completed");
    Ok(json!({
        "step": step_id,
        "status": "success",
        "duration_seconds": config.duration_seconds,
    }))
}
