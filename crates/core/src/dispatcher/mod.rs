//! Job dispatcher.
//!
//! Front door for acquisition requests: short-circuits satisfied cases,
//! deduplicates concurrent requests per case, bounds concurrency across cases
//! and delivers each job's result to its requesters.

mod runner;
mod types;

pub use runner::JobDispatcher;
pub use types::{
    AcquisitionJob, AcquisitionRequest, Acknowledgment, DispatchError, DispatcherStatus,
    Disposition, JobHandle, JobResult, JobStatus,
};
