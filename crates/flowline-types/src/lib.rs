//! Shared domain types for Flowline.
//!
//! This crate contains the core domain types used across the Flowline engine:
//! workflow graphs, executions, triggers, conditions, recurring campaigns,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod error;
pub mod event;
pub mod workflow;
