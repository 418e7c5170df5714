//! Application error type mapping to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowline_core::planner::PlanError;
use flowline_core::service::ServiceError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Requested entity does not exist.
    NotFound(String),
    /// Rejected input; `code` distinguishes cycle detection from other
    /// definition problems.
    Validation { code: &'static str, message: String },
    /// Anything else.
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Plan(PlanError::CycleDetected(msg)) => AppError::Validation {
                code: "CYCLE_DETECTED",
                message: msg,
            },
            ServiceError::Plan(err) => AppError::Validation {
                code: "INVALID_WORKFLOW",
                message: err.to_string(),
            },
            ServiceError::WorkflowNotFound(_) => AppError::NotFound("Workflow not found".to_string()),
            ServiceError::RunNotFound(_) => AppError::NotFound("Run not found".to_string()),
            ServiceError::Repository(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Validation { code, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, message)
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
