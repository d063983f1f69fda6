//! Infrastructure layer for Flowline.
//!
//! Contains implementations of the ports defined in `flowline-core`: SQLite
//! storage for workflows, executions, and campaigns, and the reqwest-backed
//! side-effect adapter node executors call out through.

pub mod effects;
pub mod sqlite;
