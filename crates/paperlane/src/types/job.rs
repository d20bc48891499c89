//! Job records and their lifecycle types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of a job
///
/// Transitions only move forward: `Queued -> Processing -> {Done | Error}`.
/// The single exception is cancellation of a job that never ran, which
/// tombstones it from `Queued` straight to `Error` with code `cancelled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobState {
    /// Whether this state is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }

    /// Stable string form used for persistence and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Error => "error",
        }
    }

    /// Parse the persisted string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "processing" => Some(JobState::Processing),
            "done" => Some(JobState::Done),
            "error" => Some(JobState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What document a job analyzes: exactly one variant is ever populated
///
/// Modeled as a sum type so the "one of two shapes" submission payload is
/// enforced by construction rather than by field-presence checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    /// Reference to a previously stored document
    DocumentRef(String),
    /// Remote URL to fetch before analysis
    RemoteUrl(String),
}

impl JobSource {
    /// Persistence discriminant
    pub fn kind(&self) -> &'static str {
        match self {
            JobSource::DocumentRef(_) => "document_ref",
            JobSource::RemoteUrl(_) => "remote_url",
        }
    }

    /// The reference or URL carried by this source
    pub fn value(&self) -> &str {
        match self {
            JobSource::DocumentRef(v) | JobSource::RemoteUrl(v) => v,
        }
    }
}

/// Kind of analysis to run, passed through to the analyzer
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    Comprehensive,
    Methodology,
    Results,
    Contextualization,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Comprehensive => "comprehensive",
            AnalysisKind::Methodology => "methodology",
            AnalysisKind::Results => "results",
            AnalysisKind::Contextualization => "contextualization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comprehensive" => Some(AnalysisKind::Comprehensive),
            "methodology" => Some(AnalysisKind::Methodology),
            "results" => Some(AnalysisKind::Results),
            "contextualization" => Some(AnalysisKind::Contextualization),
            _ => None,
        }
    }
}

/// Stable machine-readable codes for terminal job errors
pub mod codes {
    pub const CANCELLED: &str = "cancelled";
    pub const TIMEOUT: &str = "timeout";
    pub const WORKER_LOST: &str = "worker-lost";
    pub const DOMAIN_NOT_ALLOWED: &str = "domain-not-allowed";
    pub const DOCUMENT_NOT_FOUND: &str = "document-not-found";
    pub const FETCH_FAILED: &str = "fetch-failed";
    pub const NOT_A_PDF: &str = "not-a-pdf";
    pub const DOCUMENT_TOO_LARGE: &str = "document-too-large";
    pub const ANALYSIS_FAILED: &str = "analysis-failed";
}

/// Terminal error recorded on a failed job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobError {
    /// Machine-readable code, see [`codes`]
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The canonical job record
///
/// Owned exclusively by the [`JobStore`](crate::store::JobStore); everything
/// else holds transient snapshots. `epoch` is bumped on every (re)enqueue so
/// stale queue deliveries and zombie workers fail their compare-and-set
/// instead of clobbering a record another worker owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,
    /// Free-form stage label, meaningful only while `state = processing`
    pub stage: Option<String>,
    /// Percentage, non-decreasing within a processing span
    pub progress: u8,
    pub source: JobSource,
    pub kind: AnalysisKind,
    pub query: Option<String>,
    /// Optional webhook target notified on terminal state
    pub callback_url: Option<String>,
    /// Attempts consumed from the shared retry budget
    pub attempts: u32,
    /// Claim epoch; queue entries carry the epoch they were enqueued with
    pub epoch: u64,
    /// Advisory cancellation flag, checked by the worker between stages
    pub cancel_requested: bool,
    pub error: Option<JobError>,
    /// Filesystem location of the artifact, set only when `state = done`
    pub result_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh record in `queued` state
    pub fn new(
        source: JobSource,
        kind: AnalysisKind,
        query: Option<String>,
        callback_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: JobState::Queued,
            stage: None,
            progress: 0,
            source,
            kind,
            query,
            callback_url,
            attempts: 0,
            epoch: 0,
            cancel_requested: false,
            error: None,
            result_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Outward-facing result reference, present only when done
    pub fn result_ref(&self) -> Option<String> {
        if self.state == JobState::Done {
            Some(format!("/api/jobs/{}/result", self.id))
        } else {
            None
        }
    }
}
