//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (flowline-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod campaign;
pub mod workflow;

pub use campaign::CampaignRepository;
pub use workflow::WorkflowRepository;
