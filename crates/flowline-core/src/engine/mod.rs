//! The orchestration kernel.
//!
//! This module contains the engine proper:
//! - `graph` -- adjacency building, entry selection, topological validation
//! - `condition` -- fixed-operator condition evaluator
//! - `context` -- immutable-on-write execution context with templates
//! - `registry` / `executors` -- node executor trait, built-ins, type map
//! - `effects` -- side-effect capability traits (HTTP, text, messaging)
//! - `checkpoint` -- durable node/execution checkpoint manager
//! - `orchestrator` -- the execution state machine and graph walk
//! - `dispatcher` / `filters` -- trigger fan-out with per-type filters
//! - `coalescer` -- debounced batching of bulk trigger events
//! - `schedule` / `recurring` -- time-based checkers sharing one rule match
//! - `seen` -- bounded seen-recently cache backing the dedupe guards

pub mod checkpoint;
pub mod coalescer;
pub mod condition;
pub mod context;
pub mod dispatcher;
pub mod effects;
pub mod executors;
pub mod filters;
pub mod graph;
pub mod orchestrator;
pub mod recurring;
pub mod registry;
pub mod schedule;
pub mod seen;

#[cfg(test)]
pub(crate) mod testutil;
