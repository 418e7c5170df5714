//! The execution engine: per-run workers, the step state machine,
//! worker supervision, and crash recovery.

pub mod executor;
pub mod recovery;
pub mod supervisor;
pub mod worker;

pub use executor::{StepOutcome, execute_step};
pub use recovery::recover_interrupted_runs;
pub use supervisor::Supervisor;
pub use worker::{RunWorker, WorkerError};
