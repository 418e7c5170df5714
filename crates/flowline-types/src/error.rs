//! Error types shared across the workspace.

use thiserror::Error;

/// Errors from repository operations (used by trait definitions in
/// flowline-core; implemented by flowline-infra).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
