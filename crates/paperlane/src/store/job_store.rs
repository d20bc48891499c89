//! Canonical job records with compare-and-set mutation
//!
//! The store owns the authoritative copy of every job. Workers never mutate
//! a record directly: every write goes through a compare-and-set that checks
//! the expected state (and, on worker paths, the claim epoch), so a stale
//! queue delivery, an external cancellation, or a zombie worker observes a
//! failed CAS and aborts instead of clobbering state another owner holds.
//!
//! Runtime reads are served from an in-memory map; successful mutations are
//! written through to SQLite so records survive restarts.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::JobDb;
use crate::types::job::{codes, Job, JobError, JobState};
use crate::types::response::ServiceStats;

/// Terminal outcome written by [`JobStore::finish`]
#[derive(Debug, Clone)]
pub enum TerminalState {
    Done { result_path: PathBuf },
    Failed { code: String, message: String },
}

/// What a cancellation request achieved
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The job was still queued; it is now an `error/cancelled` tombstone
    /// and its queue entry has been invalidated
    Cancelled(Job),
    /// The job is processing; the flag is set and the worker will exit at
    /// the next stage boundary
    Advisory(Job),
    /// The job already reached a terminal state
    AlreadyTerminal,
    /// Unknown job id
    NotFound,
}

/// In-memory job registry with SQLite write-through
pub struct JobStore {
    jobs: DashMap<Uuid, Job>,
    db: JobDb,
}

impl JobStore {
    /// Create a store, loading any persisted records
    pub fn new(db: JobDb) -> Result<Self> {
        let jobs = DashMap::new();
        for job in db.load_jobs()? {
            jobs.insert(job.id, job);
        }
        Ok(Self { jobs, db })
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Insert a freshly created job
    pub fn create(&self, job: Job) -> Result<Uuid> {
        let id = job.id;
        self.db.upsert_job(&job)?;
        self.jobs.insert(id, job);
        Ok(id)
    }

    /// Snapshot of one record
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.get(&id).map(|j| j.clone())
    }

    /// Snapshot of every record
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Jobs currently in the given state
    pub fn in_state(&self, state: JobState) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|e| e.value().state == state)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Aggregate counters (queue/worker fields are filled by the service)
    pub fn stats(&self) -> ServiceStats {
        let mut stats = ServiceStats {
            total_jobs: self.jobs.len(),
            ..Default::default()
        };
        for entry in self.jobs.iter() {
            match entry.value().state {
                JobState::Queued => stats.queued += 1,
                JobState::Processing => stats.processing += 1,
                JobState::Done => stats.done += 1,
                JobState::Error => stats.error += 1,
            }
        }
        stats
    }

    /// Core mutation primitive: apply `mutate` iff the stored state matches
    /// `expected` and, when given, the claim epoch matches.
    ///
    /// Bumps `updated_at` and persists on success. Returns the post-mutation
    /// snapshot, or `None` when the CAS failed.
    fn compare_and_set<F>(
        &self,
        id: Uuid,
        expected: &[JobState],
        expected_epoch: Option<u64>,
        mutate: F,
    ) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let snapshot = {
            let mut entry = self.jobs.get_mut(&id)?;
            let job = entry.value_mut();
            if !expected.contains(&job.state) {
                return None;
            }
            if let Some(epoch) = expected_epoch {
                if job.epoch != epoch {
                    return None;
                }
            }
            mutate(job);
            job.updated_at = Utc::now();
            job.clone()
        };
        self.persist(&snapshot);
        Some(snapshot)
    }

    /// Claim a dequeued entry for a worker
    ///
    /// Succeeds for a queued record, or for a processing record the reaper
    /// requeued (its epoch was bumped to match the new queue entry). A
    /// mismatched epoch means the entry is stale and must be discarded.
    pub fn claim(&self, id: Uuid, epoch: u64) -> Option<Job> {
        self.compare_and_set(
            id,
            &[JobState::Queued, JobState::Processing],
            Some(epoch),
            |job| {
                job.state = JobState::Processing;
            },
        )
    }

    /// Record stage/progress reported by the owning worker
    ///
    /// Progress is clamped non-decreasing within the processing span, so a
    /// retried analyzer run that re-reports lower values never causes an
    /// observable regression.
    pub fn update_progress(&self, id: Uuid, epoch: u64, stage: &str, progress: u8) -> Option<Job> {
        self.compare_and_set(id, &[JobState::Processing], Some(epoch), |job| {
            job.stage = Some(stage.to_string());
            job.progress = job.progress.max(progress.min(100));
        })
    }

    /// Heartbeat from the owning worker; keeps the record out of the
    /// liveness reaper's view while a long stage runs
    pub fn touch(&self, id: Uuid, epoch: u64) -> bool {
        self.compare_and_set(id, &[JobState::Processing], Some(epoch), |_| {})
            .is_some()
    }

    /// Consume one attempt from the retry budget
    pub fn consume_attempt(&self, id: Uuid, epoch: u64) -> Option<u32> {
        self.compare_and_set(id, &[JobState::Processing], Some(epoch), |job| {
            job.attempts += 1;
        })
        .map(|job| job.attempts)
    }

    /// Whether cancellation has been requested for a job
    pub fn cancel_requested(&self, id: Uuid) -> bool {
        self.jobs
            .get(&id)
            .map(|j| j.cancel_requested)
            .unwrap_or(false)
    }

    /// Write the terminal state
    ///
    /// The CAS from `processing` guarantees at most one caller wins, which
    /// is what makes "exactly one terminal event per job" enforceable: only
    /// the winner publishes.
    pub fn finish(&self, id: Uuid, epoch: u64, terminal: TerminalState) -> Option<Job> {
        self.compare_and_set(id, &[JobState::Processing], Some(epoch), |job| match terminal {
            TerminalState::Done { result_path } => {
                job.state = JobState::Done;
                job.stage = None;
                job.progress = 100;
                job.result_path = Some(result_path);
                job.error = None;
            }
            TerminalState::Failed { code, message } => {
                job.state = JobState::Error;
                job.stage = None;
                job.error = Some(JobError::new(code, message));
            }
        })
    }

    /// Request cancellation
    ///
    /// Queued jobs are tombstoned immediately and their queue entry is
    /// invalidated via an epoch bump; processing jobs get an advisory flag
    /// the worker honors between stages.
    pub fn request_cancel(&self, id: Uuid) -> CancelOutcome {
        let current = match self.get(id) {
            Some(job) => job,
            None => return CancelOutcome::NotFound,
        };
        if current.is_terminal() {
            return CancelOutcome::AlreadyTerminal;
        }

        if let Some(job) = self.compare_and_set(id, &[JobState::Queued], None, |job| {
            job.state = JobState::Error;
            job.error = Some(JobError::new(codes::CANCELLED, "cancelled before execution"));
            job.cancel_requested = true;
            job.epoch += 1;
        }) {
            return CancelOutcome::Cancelled(job);
        }

        if let Some(job) = self.compare_and_set(id, &[JobState::Processing], None, |job| {
            job.cancel_requested = true;
        }) {
            return CancelOutcome::Advisory(job);
        }

        // Raced into a terminal state between the check and the CAS
        CancelOutcome::AlreadyTerminal
    }

    /// Invalidate any outstanding queue entry and hand the job a fresh epoch
    ///
    /// Used by the liveness reaper before requeueing an orphaned job, and at
    /// startup for queued records whose queue entries died with the process.
    pub fn reissue_epoch(&self, id: Uuid) -> Option<Job> {
        self.compare_and_set(
            id,
            &[JobState::Queued, JobState::Processing],
            None,
            |job| {
                job.epoch += 1;
            },
        )
    }

    /// Consume an attempt without holding a claim; reaper path
    pub fn consume_attempt_unclaimed(&self, id: Uuid) -> Option<u32> {
        self.compare_and_set(id, &[JobState::Processing], None, |job| {
            job.attempts += 1;
        })
        .map(|job| job.attempts)
    }

    /// Force a terminal failure without a claim epoch; reaper path for jobs
    /// whose worker is gone
    pub fn fail_unclaimed(&self, id: Uuid, code: &str, message: &str) -> Option<Job> {
        self.compare_and_set(id, &[JobState::Processing], None, |job| {
            job.state = JobState::Error;
            job.stage = None;
            job.error = Some(JobError::new(code, message));
            // Make any in-flight claim or late worker CAS fail
            job.epoch += 1;
        })
    }

    /// Processing jobs whose `updated_at` is older than `threshold`
    pub fn stale_processing(&self, threshold: Duration) -> Vec<Job> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(threshold).unwrap_or_else(|_| ChronoDuration::seconds(60));
        self.jobs
            .iter()
            .filter(|e| {
                let job = e.value();
                job.state == JobState::Processing && job.updated_at < cutoff
            })
            .map(|e| e.value().clone())
            .collect()
    }

    /// Terminal jobs whose `updated_at` is older than `ttl`
    pub fn terminal_older_than(&self, ttl: Duration) -> Vec<Job> {
        let cutoff =
            Utc::now() - ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(24));
        self.jobs
            .iter()
            .filter(|e| {
                let job = e.value();
                job.is_terminal() && job.updated_at < cutoff
            })
            .map(|e| e.value().clone())
            .collect()
    }

    /// Remove a record from memory and disk
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let existed = self.jobs.remove(&id).is_some();
        let persisted = self.db.delete_job(id)?;
        Ok(existed || persisted)
    }

    /// Write-through; failures are logged, not propagated, so a disk hiccup
    /// cannot wedge the in-memory state machine
    fn persist(&self, job: &Job) {
        if let Err(e) = self.db.upsert_job(job) {
            tracing::error!(job_id = %job.id, error = %e, "Failed to persist job state");
        }
    }
}

impl JobStore {
    /// Test-friendly constructor over an in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::new(JobDb::in_memory()?)
    }
}

pub type SharedJobStore = Arc<JobStore>;
