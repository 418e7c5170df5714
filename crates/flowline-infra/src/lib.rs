//! Infrastructure for Flowline: SQLite persistence and the action
//! registry. Implements the repository traits defined in
//! `flowline-core`.

pub mod actions;
pub mod config;
pub mod sqlite;
