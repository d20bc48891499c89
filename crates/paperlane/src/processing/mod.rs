//! Background processing: worker pool, retry policy, and recovery loops

pub mod backoff;
mod reaper;
mod worker;

pub use reaper::{run_liveness_reaper, run_retention_sweep};
pub use worker::{announce_terminal, finish_job, spawn_workers, JobOutcome, WorkerContext};
