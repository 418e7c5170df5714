//! Shared domain types for Flowline.
//!
//! This crate is deliberately dependency-light: every other crate in the
//! workspace consumes these types, so only serde, chrono, uuid, and
//! thiserror live here.

pub mod error;
pub mod order;
pub mod workflow;
