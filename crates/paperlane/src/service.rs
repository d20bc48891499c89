//! The public job service: submit, status, subscribe, result, cancel
//!
//! Composes the store, queue, bus, and providers, and owns the background
//! tasks (worker pool, liveness reaper, retention sweep). Status and result
//! reads go straight to the store, independent of the queue and the event
//! bus, so polling keeps working even when streaming is unavailable.

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, WebhookNotifier};
use crate::processing::{
    announce_terminal, run_liveness_reaper, run_retention_sweep, spawn_workers, WorkerContext,
};
use crate::providers::{AnalyzerProvider, DocumentProvider};
use crate::queue::{JobQueue, QueueEntry};
use crate::storage::JobDb;
use crate::store::{CancelOutcome, JobStore};
use crate::types::event::JobEvent;
use crate::types::job::{Job, JobState};
use crate::types::request::SubmitRequest;
use crate::types::response::ServiceStats;

/// Job orchestration service
pub struct JobService {
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    bus: Arc<EventBus>,
    webhooks: Arc<WebhookNotifier>,
    config: Arc<JobsConfig>,
    cancel: CancellationToken,
}

impl JobService {
    /// Wire up the service and start its background tasks
    pub async fn start(
        config: JobsConfig,
        documents: Arc<dyn DocumentProvider>,
        analyzer: Arc<dyn AnalyzerProvider>,
    ) -> Result<Arc<Self>> {
        let results_dir = config.storage.results_dir();
        std::fs::create_dir_all(&config.storage.data_dir)?;
        std::fs::create_dir_all(&results_dir)?;
        std::fs::create_dir_all(config.storage.uploads_dir())?;

        let db = JobDb::new(config.storage.database_path())?;
        let store = Arc::new(JobStore::new(db)?);
        let queue = Arc::new(JobQueue::new(config.queue.capacity));
        let bus = Arc::new(EventBus::new(&config.events));
        let webhooks = Arc::new(WebhookNotifier::new(&config.webhook));
        let config = Arc::new(config);

        let ctx = Arc::new(WorkerContext {
            store: store.clone(),
            queue: queue.clone(),
            bus: bus.clone(),
            documents,
            analyzer,
            webhooks: webhooks.clone(),
            config: config.clone(),
            results_dir,
        });

        let cancel = CancellationToken::new();
        spawn_workers(ctx.clone(), cancel.clone());
        tokio::spawn(run_liveness_reaper(ctx.clone(), cancel.clone()));
        tokio::spawn(run_retention_sweep(ctx.clone(), cancel.clone()));

        let service = Arc::new(Self {
            store,
            queue,
            bus,
            webhooks,
            config,
            cancel,
        });
        service.recover_persisted_queue();

        tracing::info!(
            workers = service.config.queue.workers,
            capacity = service.config.queue.capacity,
            "Job service started"
        );
        Ok(service)
    }

    /// Re-enqueue jobs that were queued when the previous process exited.
    /// Processing-state records are left to the liveness reaper.
    fn recover_persisted_queue(&self) {
        let queued = self.store.in_state(JobState::Queued);
        if queued.is_empty() {
            return;
        }
        tracing::info!(count = queued.len(), "Re-enqueueing persisted jobs");
        for job in queued {
            let Some(job) = self.store.reissue_epoch(job.id) else {
                continue;
            };
            if let Err(e) = self.queue.enqueue(QueueEntry::new(job.id, job.epoch)) {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to re-enqueue persisted job");
            }
        }
    }

    /// Validate a submission, create the job, and enqueue it
    ///
    /// Never blocks waiting for a worker: a full queue rejects the
    /// submission with [`Error::Saturated`] and rolls the record back, so a
    /// rejected submission leaves no trace.
    pub fn submit(&self, request: SubmitRequest) -> Result<Job> {
        let source = request.source().map_err(Error::Validation)?;
        let callback_url = request.validated_callback().map_err(Error::Validation)?;

        let job = Job::new(source, request.analysis_kind, request.query.clone(), callback_url);
        let id = self.store.create(job.clone())?;

        if let Err(e) = self.queue.enqueue(QueueEntry::new(id, job.epoch)) {
            if let Err(cleanup) = self.store.delete(id) {
                tracing::error!(job_id = %id, error = %cleanup, "Failed to roll back rejected job");
            }
            return Err(e);
        }

        tracing::info!(job_id = %id, source = job.source.kind(), "Job submitted");
        Ok(job)
    }

    /// Current record for a job; pure store read
    pub fn status(&self, id: Uuid) -> Result<Job> {
        self.store.get(id).ok_or(Error::NotFound(id))
    }

    /// All known jobs, oldest first
    pub fn list(&self) -> Vec<Job> {
        self.store.list()
    }

    /// Aggregate counters
    pub fn stats(&self) -> ServiceStats {
        let mut stats = self.store.stats();
        stats.queue_capacity = self.queue.capacity();
        stats.worker_count = self.config.queue.workers;
        stats
    }

    /// Read the artifact of a completed job
    pub async fn result(&self, id: Uuid) -> Result<serde_json::Value> {
        let job = self.store.get(id).ok_or(Error::NotFound(id))?;
        match job.state {
            JobState::Done => {
                let path = job
                    .result_path
                    .ok_or_else(|| Error::internal("done job has no artifact path"))?;
                let bytes = tokio::fs::read(&path).await?;
                Ok(serde_json::from_slice(&bytes)?)
            }
            JobState::Error => {
                let error = job.error.unwrap_or_else(|| {
                    crate::types::job::JobError::new("unknown", "no error recorded")
                });
                Err(Error::JobFailed {
                    code: error.code,
                    message: error.message,
                })
            }
            JobState::Queued | JobState::Processing => Err(Error::NotReady(id)),
        }
    }

    /// Best-effort cancellation
    ///
    /// Queued jobs terminate immediately; processing jobs get an advisory
    /// flag their worker honors between stages.
    pub fn cancel(&self, id: Uuid) -> Result<Job> {
        match self.store.request_cancel(id) {
            CancelOutcome::Cancelled(job) => {
                tracing::info!(job_id = %id, "Queued job cancelled");
                announce_terminal(&self.bus, &self.webhooks, &job);
                Ok(job)
            }
            CancelOutcome::Advisory(job) => {
                tracing::info!(job_id = %id, "Cancellation requested for running job");
                Ok(job)
            }
            CancelOutcome::AlreadyTerminal => Err(Error::AlreadyTerminal(id)),
            CancelOutcome::NotFound => Err(Error::NotFound(id)),
        }
    }

    /// Attach to a job's event stream
    ///
    /// Replays the last known state first so late subscribers are never
    /// stranded, then follows live events until the terminal event closes
    /// the stream. Reconnecting is just calling this again.
    pub fn subscribe(&self, id: Uuid) -> Result<BoxStream<'static, JobEvent>> {
        let job = self.store.get(id).ok_or(Error::NotFound(id))?;

        // Don't recreate a channel the terminal teardown already removed
        let subscription = if job.is_terminal() {
            self.bus.peek(id)
        } else {
            Some(self.bus.subscribe(id))
        };

        let Some(subscription) = subscription else {
            // Terminal and torn down: a single synthesized replay event
            let event = JobEvent::snapshot_of(&job);
            return Ok(futures::stream::once(async move { event }).boxed());
        };

        let mut backlog = subscription.backlog;
        if backlog.is_empty() {
            // Nothing published yet; replay the store snapshot. Re-read so a
            // terminal transition between lookup and subscribe is not missed.
            let snapshot = self.store.get(id).unwrap_or(job);
            backlog.push(JobEvent::snapshot_of(&snapshot));
        }
        let receiver = subscription.receiver;

        let stream = async_stream::stream! {
            let mut done = false;
            for event in backlog {
                done |= event.is_terminal();
                yield event;
            }
            if done {
                return;
            }
            let Some(mut receiver) = receiver else {
                return;
            };
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped events are recoverable by polling status
                        tracing::warn!(job_id = %id, skipped, "Subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(stream.boxed())
    }

    /// Service configuration
    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    /// Stop the worker pool and background loops
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for JobService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
