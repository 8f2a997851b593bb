//! Acquisition orchestrator.
//!
//! Drives a single case through the portal workflow and reports a terminal
//! [`AcquisitionOutcome`]. Deduplication of concurrent requests and
//! notification live in the dispatcher; the orchestrator only knows about
//! one run at a time.

mod runner;
mod script;
mod types;

pub use runner::Orchestrator;
pub use script::PortalScript;
pub use types::{
    AcquisitionFailure, AcquisitionOutcome, AcquisitionStep, ArtifactSource, FailureCause,
    StoredArtifact,
};
