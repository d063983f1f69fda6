//! Observability setup for Flowline.
//!
//! One entry point, [`tracing_setup::init_tracing`], called once at process
//! start before the engine is wired up.

pub mod tracing_setup;
