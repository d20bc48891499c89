//! Events published on the per-job broadcast channels
//!
//! Events describe observable changes; they are not a source of truth. The
//! job record is. A consumer that misses events reconstructs the same
//! information by polling job status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{Job, JobState};

/// One observable change to a job, tagged for the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// State, stage, or progress changed
    State {
        job_id: Uuid,
        state: JobState,
        stage: Option<String>,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    /// Informational message (retries, requeues)
    Log {
        job_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Terminal success
    Done {
        job_id: Uuid,
        result_ref: String,
        timestamp: DateTime<Utc>,
    },
    /// Terminal failure
    Error {
        job_id: Uuid,
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// The job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::State { job_id, .. }
            | JobEvent::Log { job_id, .. }
            | JobEvent::Done { job_id, .. }
            | JobEvent::Error { job_id, .. } => *job_id,
        }
    }

    /// Exactly one terminal event is published per job
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done { .. } | JobEvent::Error { .. })
    }

    /// Build a `state` event from the current record
    pub fn state_of(job: &Job) -> Self {
        JobEvent::State {
            job_id: job.id,
            state: job.state,
            stage: job.stage.clone(),
            progress: job.progress,
            timestamp: Utc::now(),
        }
    }

    /// Build a log event
    pub fn log(job_id: Uuid, message: impl Into<String>) -> Self {
        JobEvent::Log {
            job_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build the terminal event matching a terminal record
    ///
    /// Returns the `state` snapshot instead if the record has not actually
    /// reached a terminal state, so callers replaying from a snapshot always
    /// get something coherent.
    pub fn terminal_of(job: &Job) -> Self {
        match job.state {
            JobState::Done => JobEvent::Done {
                job_id: job.id,
                result_ref: job.result_ref().unwrap_or_default(),
                timestamp: Utc::now(),
            },
            JobState::Error => {
                let (code, message) = job
                    .error
                    .as_ref()
                    .map(|e| (e.code.clone(), e.message.clone()))
                    .unwrap_or_else(|| ("unknown".to_string(), String::new()));
                JobEvent::Error {
                    job_id: job.id,
                    code,
                    message,
                    timestamp: Utc::now(),
                }
            }
            _ => JobEvent::state_of(job),
        }
    }

    /// Replay event for a subscriber attaching right now
    pub fn snapshot_of(job: &Job) -> Self {
        if job.is_terminal() {
            JobEvent::terminal_of(job)
        } else {
            JobEvent::state_of(job)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::job::{codes, AnalysisKind, JobError, JobSource};

    fn sample_job() -> Job {
        Job::new(
            JobSource::DocumentRef("doc".into()),
            AnalysisKind::Comprehensive,
            None,
            None,
        )
    }

    #[test]
    fn wire_tags_match_the_protocol() {
        let job = sample_job();
        let state = serde_json::to_value(JobEvent::state_of(&job)).unwrap();
        assert_eq!(state["type"], "state");

        let log = serde_json::to_value(JobEvent::log(job.id, "retrying")).unwrap();
        assert_eq!(log["type"], "log");

        let mut done = sample_job();
        done.state = JobState::Done;
        let done = serde_json::to_value(JobEvent::terminal_of(&done)).unwrap();
        assert_eq!(done["type"], "done");

        let mut failed = sample_job();
        failed.state = JobState::Error;
        failed.error = Some(JobError::new(codes::TIMEOUT, "stage timed out"));
        let failed = serde_json::to_value(JobEvent::terminal_of(&failed)).unwrap();
        assert_eq!(failed["type"], "error");
        assert_eq!(failed["code"], codes::TIMEOUT);
    }

    #[test]
    fn snapshot_of_terminal_job_is_terminal() {
        let mut job = sample_job();
        job.state = JobState::Error;
        job.error = Some(JobError::new(codes::CANCELLED, "cancelled by caller"));
        assert!(JobEvent::snapshot_of(&job).is_terminal());
    }

    #[test]
    fn snapshot_of_live_job_is_state() {
        let job = sample_job();
        let event = JobEvent::snapshot_of(&job);
        assert!(!event.is_terminal());
        assert!(matches!(event, JobEvent::State { .. }));
    }
}
