//! paperlane: asynchronous job orchestration and progress streaming for
//! long-running document analysis
//!
//! A client submits a document by stored reference or remote URL; a bounded
//! queue admits it (or rejects fast when full); a fixed worker pool drives
//! the analyzer through its stages, persisting every transition and fanning
//! progress out to subscribers. Observers follow along over a per-job event
//! stream or by polling status; both read paths are backed by the same job
//! store, so polling always works even when streaming is unavailable.

pub mod config;
pub mod error;
pub mod events;
pub mod processing;
pub mod providers;
pub mod queue;
pub mod server;
pub mod service;
pub mod storage;
pub mod store;
pub mod types;

pub use config::JobsConfig;
pub use error::{Error, Result};
pub use service::JobService;
pub use types::{
    codes, AnalysisKind, Job, JobError, JobEvent, JobSource, JobState, SubmitRequest,
};
