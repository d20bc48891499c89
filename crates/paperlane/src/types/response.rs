//! Outward-facing response types
//!
//! Status payloads carry every field a client might need; fields that do not
//! apply in the current state are null, never omitted, so polling clients can
//! deserialize one fixed shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{AnalysisKind, Job, JobState};

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: Uuid,
    pub state: JobState,
}

impl From<&Job> for SubmitResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            state: job.state,
        }
    }
}

/// Full status view of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub state: JobState,
    pub stage: Option<String>,
    pub progress: u8,
    pub analysis_kind: AnalysisKind,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            state: job.state,
            stage: job.stage.clone(),
            progress: job.progress,
            analysis_kind: job.kind,
            error_code: job.error.as_ref().map(|e| e.code.clone()),
            error_message: job.error.as_ref().map(|e| e.message.clone()),
            result_ref: job.result_ref(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Condensed job entry for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub state: JobState,
    pub stage: Option<String>,
    pub progress: u8,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            state: job.state,
            stage: job.stage.clone(),
            progress: job.progress,
            error_code: job.error.as_ref().map(|e| e.code.clone()),
            created_at: job.created_at,
        }
    }
}

/// Aggregate counters across all known jobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub total_jobs: usize,
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
    pub queue_capacity: usize,
    pub worker_count: usize,
}

/// Response for the job listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub stats: ServiceStats,
}
