//! Orchestration kernel and repository trait definitions for Flowline.
//!
//! This crate defines the "ports" (repository and capability traits) that the
//! infrastructure layer implements. It depends only on `flowline-types` --
//! never on `flowline-infra` or any database/IO crate.

pub mod engine;
pub mod event;
pub mod repository;
