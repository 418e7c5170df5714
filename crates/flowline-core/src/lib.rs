//! Engine core for Flowline: planning, execution, and the storage ports.
//!
//! This crate defines the repository traits ("ports") that the
//! infrastructure layer implements. It depends only on `flowline-types`,
//! never on a database or IO crate.
//!
//! - `planner` -- definition validation and stable topological ordering
//! - `task` -- the simulated step task (sleep + probabilistic failure)
//! - `repository` -- storage traits implemented by `flowline-infra`
//! - `engine` -- step executor, run worker, supervisor, crash recovery
//! - `service` -- the operations exposed to the hosting surface

pub mod engine;
pub mod planner;
pub mod repository;
pub mod service;
pub mod task;
