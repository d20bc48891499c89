//! Authoritative job state

mod job_store;

pub use job_store::{CancelOutcome, JobStore, SharedJobStore, TerminalState};
