//! Storage ports implemented by the infrastructure layer.

pub mod order;
pub mod workflow;

pub use order::OrderRepository;
pub use workflow::{ActionDispatch, CompleteStepError, WorkflowRepository};
