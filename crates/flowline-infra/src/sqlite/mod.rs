//! SQLite-backed repositories and the database pool.

pub mod order;
pub mod pool;
pub mod workflow;

pub use order::SqliteOrderRepository;
pub use pool::DatabasePool;
pub use workflow::SqliteWorkflowRepository;
