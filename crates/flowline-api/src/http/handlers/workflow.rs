//! Workflow definition handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use flowline_types::workflow::{Workflow, WorkflowDefinition};

use crate::http::error::AppError;
use crate::state::AppState;

/// Listing entry: no definition payload.
#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Full workflow including the verbatim definition.
#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    pub id: Uuid,
    pub name: String,
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
}

impl From<Workflow> for WorkflowDetail {
    fn from(w: Workflow) -> Self {
        Self {
            id: w.id,
            name: w.name,
            definition: w.definition,
            created_at: w.created_at,
        }
    }
}

/// POST /api/v1/workflows - Validate and store a workflow definition.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<WorkflowDetail>), AppError> {
    let workflow = state.service.create_workflow(body).await?;
    Ok((StatusCode::CREATED, Json(workflow.into())))
}

/// GET /api/v1/workflows - List workflows, newest first.
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowSummary>>, AppError> {
    let workflows = state.service.list_workflows().await?;
    let summaries = workflows
        .into_iter()
        .map(|w| WorkflowSummary {
            id: w.id,
            name: w.name,
            created_at: w.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// GET /api/v1/workflows/:id - Get a workflow with its full definition.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = state.service.get_workflow(id).await?;
    Ok(Json(workflow.into()))
}
