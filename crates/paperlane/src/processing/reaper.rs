//! Background recovery loops
//!
//! The liveness reaper detects jobs stuck in `processing` because their
//! worker died: once `updated_at` goes stale past the threshold, the job is
//! requeued under the shared attempt budget, or failed with `worker-lost`
//! when the budget is spent. The retention sweep deletes terminal jobs (and
//! their artifacts) once they outlive the configured TTL.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::queue::QueueEntry;
use crate::types::event::JobEvent;
use crate::types::job::codes;

use super::worker::{announce_terminal, WorkerContext};

/// Scan for orphaned processing jobs and recover them
pub async fn run_liveness_reaper(ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    let threshold = ctx.config.retention.liveness_threshold();
    let mut interval = tokio::time::interval(ctx.config.retention.reaper_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        threshold_secs = threshold.as_secs(),
        "Liveness reaper started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Liveness reaper stopping");
                break;
            }
            _ = interval.tick() => {
                reap_once(&ctx).await;
            }
        }
    }
}

async fn reap_once(ctx: &WorkerContext) {
    let threshold = ctx.config.retention.liveness_threshold();
    for job in ctx.store.stale_processing(threshold) {
        let id = job.id;

        if job.cancel_requested {
            if let Some(job) = ctx.store.fail_unclaimed(
                id,
                codes::CANCELLED,
                "cancelled while its worker was unreachable",
            ) {
                tracing::info!(job_id = %id, "Reaped cancelled orphan");
                announce_terminal(&ctx.bus, &ctx.webhooks, &job);
            }
            continue;
        }

        // A requeue consumes an attempt, same budget as worker retries
        let Some(attempts) = ctx.store.consume_attempt_unclaimed(id) else {
            continue;
        };
        let budget = ctx.config.retry.max_attempts;

        if attempts >= budget {
            if let Some(job) = ctx.store.fail_unclaimed(
                id,
                codes::WORKER_LOST,
                &format!("worker lost and attempt budget exhausted after {} attempts", attempts),
            ) {
                tracing::warn!(job_id = %id, attempts, "Orphaned job failed: budget exhausted");
                announce_terminal(&ctx.bus, &ctx.webhooks, &job);
            }
            continue;
        }

        // Invalidate the dead worker's claim, then hand the job back out
        let Some(job) = ctx.store.reissue_epoch(id) else {
            continue;
        };
        match ctx.queue.enqueue(QueueEntry::new(id, job.epoch)) {
            Ok(()) => {
                tracing::warn!(job_id = %id, attempts, budget, "Worker presumed lost, job requeued");
                ctx.bus.publish(JobEvent::log(
                    id,
                    format!(
                        "worker presumed lost; requeued (attempt {}/{})",
                        attempts, budget
                    ),
                ));
            }
            Err(e) => {
                // The record keeps its bumped epoch; the next scan retries
                tracing::warn!(job_id = %id, error = %e, "Requeue failed, will retry next scan");
            }
        }
    }
}

/// Delete terminal jobs and their artifacts once the TTL elapses
pub async fn run_retention_sweep(ctx: Arc<WorkerContext>, cancel: CancellationToken) {
    let ttl = ctx.config.retention.job_ttl();
    let mut interval = tokio::time::interval(ctx.config.retention.sweep_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(ttl_secs = ttl.as_secs(), "Retention sweep started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention sweep stopping");
                break;
            }
            _ = interval.tick() => {
                sweep_once(&ctx).await;
            }
        }
    }
}

async fn sweep_once(ctx: &WorkerContext) {
    let ttl = ctx.config.retention.job_ttl();
    let expired = ctx.store.terminal_older_than(ttl);
    if expired.is_empty() {
        return;
    }

    let mut deleted = 0usize;
    for job in expired {
        if let Some(path) = &job.result_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to remove artifact");
                }
            }
        }
        match ctx.store.delete(job.id) {
            Ok(_) => {
                ctx.bus.remove(job.id);
                deleted += 1;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to delete expired job");
            }
        }
    }
    if deleted > 0 {
        tracing::info!(deleted, "Retention sweep purged expired jobs");
    }
}
