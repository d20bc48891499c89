//! The worker pool: claims queued jobs and drives them to a terminal state
//!
//! Each worker pulls entries from the shared queue, claims the record with
//! an epoch-checked compare-and-set, and drives two coarse stages: document
//! resolution (`fetching`) and the analyzer run, whose callback reports the
//! fine-grained stages. Transient failures re-enter the failed stage after
//! a backoff delay until the shared attempt budget is exhausted. Every
//! stage attempt runs under its configured timeout with a heartbeat keeping
//! `updated_at` fresh, so the liveness reaper only fires on workers that
//! actually died.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::events::{EventBus, WebhookNotifier};
use crate::providers::{AnalysisRequest, AnalyzerProvider, DocumentProvider, FetchedDocument};
use crate::queue::{JobQueue, QueueEntry};
use crate::store::{JobStore, TerminalState};
use crate::types::event::JobEvent;
use crate::types::job::{codes, Job};

use super::backoff;

/// Everything a worker (or the reaper) needs to drive jobs
pub struct WorkerContext {
    pub store: Arc<JobStore>,
    pub queue: Arc<JobQueue>,
    pub bus: Arc<EventBus>,
    pub documents: Arc<dyn DocumentProvider>,
    pub analyzer: Arc<dyn AnalyzerProvider>,
    pub webhooks: Arc<WebhookNotifier>,
    pub config: Arc<JobsConfig>,
    pub results_dir: PathBuf,
}

/// Terminal outcome a worker hands to [`finish_job`]
pub enum JobOutcome {
    Done(serde_json::Value),
    Failed { code: String, message: String },
}

/// Spawn the fixed worker pool
pub fn spawn_workers(ctx: Arc<WorkerContext>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    let count = ctx.config.queue.workers.max(1);
    tracing::info!(workers = count, "Starting worker pool");
    (0..count)
        .map(|index| {
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                worker_loop(index, ctx, cancel).await;
            })
        })
        .collect()
}

async fn worker_loop(index: usize, ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    tracing::debug!(worker = index, "Worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            entry = ctx.queue.dequeue() => match entry {
                Some(entry) => process_entry(&ctx, entry).await,
                None => break,
            },
        }
    }
    tracing::debug!(worker = index, "Worker stopped");
}

/// Drive one queue entry to completion or discard it
async fn process_entry(ctx: &WorkerContext, entry: QueueEntry) {
    let Some(job) = ctx.store.claim(entry.id, entry.epoch) else {
        // Cancelled before execution, superseded by a requeue, or already
        // claimed; the record owner is someone else now.
        tracing::debug!(job_id = %entry.id, epoch = entry.epoch, "Discarding stale queue entry");
        return;
    };
    let id = job.id;
    let epoch = entry.epoch;

    tracing::info!(job_id = %id, source = job.source.kind(), attempts = job.attempts, "Job claimed");

    report_stage(ctx, id, epoch, "fetching");

    // Stage 1: resolve the document
    let document = loop {
        if cancelled(ctx, id, epoch).await {
            return;
        }
        let attempt = run_stage(
            ctx,
            id,
            epoch,
            ctx.config.processing.fetch_timeout(),
            ctx.documents.resolve(&job.source),
        )
        .await;
        match attempt {
            StageResult::Ok(document) => break document,
            StageResult::Retry(code, message) => {
                if !retry_after_backoff(ctx, id, epoch, "fetching", &code, &message).await {
                    return;
                }
            }
            StageResult::Fatal(code, message) => {
                finish_job(ctx, id, epoch, JobOutcome::Failed { code, message }).await;
                return;
            }
        }
    };

    if cancelled(ctx, id, epoch).await {
        return;
    }

    // Stage 2: run the analyzer; its callback reports the inner stages
    let request = AnalysisRequest {
        kind: job.kind,
        query: job.query.clone(),
    };
    let artifact = loop {
        let attempt = run_analyzer(ctx, id, epoch, &document, &request).await;
        match attempt {
            StageResult::Ok(artifact) => break artifact,
            StageResult::Retry(code, message) => {
                if !retry_after_backoff(ctx, id, epoch, "analyzing", &code, &message).await {
                    return;
                }
            }
            StageResult::Fatal(code, message) => {
                finish_job(ctx, id, epoch, JobOutcome::Failed { code, message }).await;
                return;
            }
        }
    };

    report_stage(ctx, id, epoch, "finalizing");
    finish_job(ctx, id, epoch, JobOutcome::Done(artifact)).await;
}

/// One stage attempt, collapsed into retry/fatal classification
enum StageResult<T> {
    Ok(T),
    Retry(String, String),
    Fatal(String, String),
}

async fn run_stage<F, T>(
    ctx: &WorkerContext,
    id: Uuid,
    epoch: u64,
    limit: Duration,
    fut: F,
) -> StageResult<T>
where
    F: std::future::Future<Output = Result<T, crate::providers::AnalysisError>>,
{
    match with_heartbeat(ctx, id, epoch, limit, fut).await {
        Some(Ok(value)) => StageResult::Ok(value),
        Some(Err(err)) if err.is_transient() => StageResult::Retry(err.code, err.message),
        Some(Err(err)) => StageResult::Fatal(err.code, err.message),
        None => StageResult::Retry(
            codes::TIMEOUT.to_string(),
            format!("stage exceeded its {}s limit", limit.as_secs()),
        ),
    }
}

async fn run_analyzer(
    ctx: &WorkerContext,
    id: Uuid,
    epoch: u64,
    document: &FetchedDocument,
    request: &AnalysisRequest,
) -> StageResult<serde_json::Value> {
    let store = ctx.store.clone();
    let bus = ctx.bus.clone();
    let sink = move |stage: &str, progress: u8| {
        if let Some(job) = store.update_progress(id, epoch, stage, progress) {
            bus.publish(JobEvent::state_of(&job));
        }
    };

    run_stage(
        ctx,
        id,
        epoch,
        ctx.config.processing.analyze_timeout(),
        ctx.analyzer.run(document, request, &sink),
    )
    .await
}

/// Run a stage future under its timeout while touching the record on a
/// heartbeat interval; `None` means the timeout elapsed
async fn with_heartbeat<F, T>(
    ctx: &WorkerContext,
    id: Uuid,
    epoch: u64,
    limit: Duration,
    fut: F,
) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    let mut heartbeat = tokio::time::interval(ctx.config.processing.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let deadline = tokio::time::sleep(limit);
    tokio::pin!(fut);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            out = &mut fut => return Some(out),
            _ = &mut deadline => return None,
            _ = heartbeat.tick() => {
                ctx.store.touch(id, epoch);
            }
        }
    }
}

/// Record stage entry without moving progress
fn report_stage(ctx: &WorkerContext, id: Uuid, epoch: u64, stage: &str) {
    if let Some(job) = ctx.store.update_progress(id, epoch, stage, 0) {
        ctx.bus.publish(JobEvent::state_of(&job));
    }
}

/// Check the advisory cancellation flag; finishes the job when set
async fn cancelled(ctx: &WorkerContext, id: Uuid, epoch: u64) -> bool {
    if !ctx.store.cancel_requested(id) {
        return false;
    }
    finish_job(
        ctx,
        id,
        epoch,
        JobOutcome::Failed {
            code: codes::CANCELLED.to_string(),
            message: "cancelled by caller".to_string(),
        },
    )
    .await;
    true
}

/// Consume an attempt and sleep the backoff delay
///
/// Returns `false` when the job is finished instead (budget exhausted,
/// ownership lost, or cancellation observed during the sleep).
async fn retry_after_backoff(
    ctx: &WorkerContext,
    id: Uuid,
    epoch: u64,
    stage: &str,
    code: &str,
    message: &str,
) -> bool {
    let Some(attempts) = ctx.store.consume_attempt(id, epoch) else {
        tracing::warn!(job_id = %id, "Lost job ownership during retry bookkeeping");
        return false;
    };

    let budget = ctx.config.retry.max_attempts;
    if attempts >= budget {
        tracing::warn!(job_id = %id, attempts, code, "Attempt budget exhausted");
        finish_job(
            ctx,
            id,
            epoch,
            JobOutcome::Failed {
                code: code.to_string(),
                message: format!("gave up after {} attempts: {}", attempts, message),
            },
        )
        .await;
        return false;
    }

    let delay = backoff::delay_for_attempt(attempts, &ctx.config.retry);
    tracing::info!(
        job_id = %id,
        stage,
        code,
        attempts,
        budget,
        delay_ms = delay.as_millis() as u64,
        "Transient failure, backing off"
    );
    ctx.bus.publish(JobEvent::log(
        id,
        format!(
            "transient failure at {} ({}); retrying in {}ms (attempt {}/{})",
            stage,
            code,
            delay.as_millis(),
            attempts,
            budget
        ),
    ));

    // The sleep counts toward liveness, so keep touching the record
    with_heartbeat(ctx, id, epoch, delay, std::future::pending::<()>()).await;

    !cancelled(ctx, id, epoch).await
}

/// Write the terminal state, publish exactly one terminal event, and fire
/// the webhook. Shared by the worker and the liveness reaper.
pub async fn finish_job(ctx: &WorkerContext, id: Uuid, epoch: u64, outcome: JobOutcome) {
    let terminal = match outcome {
        JobOutcome::Done(artifact) => {
            let path = ctx.results_dir.join(format!("{}.json", id));
            match write_artifact(&path, &artifact).await {
                Ok(()) => TerminalState::Done { result_path: path },
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to persist artifact");
                    TerminalState::Failed {
                        code: codes::ANALYSIS_FAILED.to_string(),
                        message: format!("failed to persist artifact: {}", e),
                    }
                }
            }
        }
        JobOutcome::Failed { code, message } => TerminalState::Failed { code, message },
    };

    match ctx.store.finish(id, epoch, terminal) {
        Some(job) => {
            tracing::info!(job_id = %id, state = %job.state, "Job finished");
            announce_terminal(&ctx.bus, &ctx.webhooks, &job);
        }
        None => {
            // Someone else (reaper, newer claim) owns the record now
            tracing::warn!(job_id = %id, epoch, "Terminal write lost its compare-and-set");
        }
    }
}

/// Publish the terminal event and fire the webhook for a job that just
/// reached its terminal state
pub fn announce_terminal(bus: &EventBus, webhooks: &Arc<WebhookNotifier>, job: &Job) {
    let event = JobEvent::terminal_of(job);
    bus.publish(event.clone());
    if let Some(url) = &job.callback_url {
        webhooks.notify_detached(url.clone(), event);
    }
}

async fn write_artifact(path: &PathBuf, artifact: &serde_json::Value) -> crate::error::Result<()> {
    let bytes = serde_json::to_vec_pretty(artifact)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
