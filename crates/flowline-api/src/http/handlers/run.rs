//! Run handlers: start, list, and inspect.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flowline_types::workflow::{Run, RunStatus, StepState, StepStatus};

use crate::http::error::AppError;
use crate::state::AppState;

/// Optional request body for POST /workflows/:id/runs.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    /// Order to dispatch actions against.
    #[serde(default)]
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub id: Uuid,
    pub step_id: String,
    pub step_index: u32,
    pub status: StepStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<StepState> for StepResponse {
    fn from(s: StepState) -> Self {
        Self {
            id: s.id,
            step_id: s.step_id,
            step_index: s.step_index,
            status: s.status,
            retry_count: s.retry_count,
            max_retries: s.max_retries,
            started_at: s.started_at,
            completed_at: s.completed_at,
            error_message: s.error_message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub order_id: Option<Uuid>,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub steps: Vec<StepResponse>,
}

fn summarize(run: Run, workflow_name: String) -> RunSummary {
    RunSummary {
        id: run.id,
        workflow_id: run.workflow_id,
        workflow_name,
        order_id: run.order_id,
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
    }
}

/// POST /api/v1/workflows/:id/runs - Create a run and dispatch its
/// worker. Returns 202 immediately; the steps come back PENDING.
pub async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<StartRunRequest>>,
) -> Result<(StatusCode, Json<RunDetail>), AppError> {
    let workflow = state.service.get_workflow(id).await?;
    let order_id = body.map(|Json(b)| b.order_id).unwrap_or_default();

    let (run, steps) = state.service.start_run(id, order_id).await?;
    let detail = RunDetail {
        summary: summarize(run, workflow.name),
        steps: steps.into_iter().map(StepResponse::from).collect(),
    };
    Ok((StatusCode::ACCEPTED, Json(detail)))
}

/// GET /api/v1/runs - List runs with their workflow names, newest first.
pub async fn list_runs(State(state): State<AppState>) -> Result<Json<Vec<RunSummary>>, AppError> {
    let runs = state.service.list_runs().await?;
    let names: HashMap<Uuid, String> = state
        .service
        .list_workflows()
        .await?
        .into_iter()
        .map(|w| (w.id, w.name))
        .collect();

    let summaries = runs
        .into_iter()
        .map(|run| {
            let name = names.get(&run.workflow_id).cloned().unwrap_or_default();
            summarize(run, name)
        })
        .collect();
    Ok(Json(summaries))
}

/// GET /api/v1/runs/:run_id - Run snapshot with steps in execution order.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunDetail>, AppError> {
    let (run, steps) = state.service.get_run(run_id).await?;
    let workflow = state.service.get_workflow(run.workflow_id).await?;

    Ok(Json(RunDetail {
        summary: summarize(run, workflow.name),
        steps: steps.into_iter().map(StepResponse::from).collect(),
    }))
}
