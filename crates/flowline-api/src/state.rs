//! Application state wiring the store, engine, and service together.
//!
//! AppState pins the generic core components to the concrete SQLite
//! implementations and owns the startup ordering: pool + migrations
//! first, then crash recovery, then the service the handlers use.

use std::sync::Arc;

use flowline_core::engine::{Supervisor, recover_interrupted_runs};
use flowline_core::service::WorkflowService;
use flowline_infra::config::{database_url, resolve_data_dir};
use flowline_infra::sqlite::order::SqliteOrderRepository;
use flowline_infra::sqlite::pool::DatabasePool;
use flowline_infra::sqlite::workflow::SqliteWorkflowRepository;

/// Shared application state for the REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService<SqliteWorkflowRepository>>,
    pub order_repo: Arc<SqliteOrderRepository>,
}

impl AppState {
    /// Connect to the store, wire the engine, and resume interrupted
    /// runs. Recovery submissions are all accepted before this returns,
    /// so the HTTP listener never opens ahead of them.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let workflow_repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let order_repo = Arc::new(SqliteOrderRepository::new(db_pool.clone()));
        let supervisor = Arc::new(Supervisor::new(Arc::clone(&workflow_repo)));

        let resumed = recover_interrupted_runs(&supervisor).await?;
        if resumed > 0 {
            tracing::info!(count = resumed, "resumed interrupted runs at startup");
        }

        let service = Arc::new(WorkflowService::new(workflow_repo, supervisor));

        Ok(Self {
            service,
            order_repo,
        })
    }
}
