//! End-to-end lifecycle tests against the job service

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use common::*;
use paperlane::types::{JobEvent, JobState, SubmitRequest};
use paperlane::{Error, JobService};

#[tokio::test(flavor = "multi_thread")]
async fn submitted_job_runs_to_done_with_ordered_events() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::start(
        fast_config(dir.path()),
        Arc::new(OkDocuments),
        Arc::new(InstantAnalyzer::new()),
    )
    .await
    .unwrap();

    let job = service
        .submit(SubmitRequest::for_document("paper-1").with_query("what is the sample size?"))
        .unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.progress, 0);

    let events = collect_events(
        service.subscribe(job.id).unwrap(),
        Duration::from_secs(5),
    )
    .await;

    // The stream ends with exactly one terminal event
    assert!(events.last().unwrap().is_terminal());
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match events.last().unwrap() {
        JobEvent::Done { result_ref, .. } => {
            assert_eq!(result_ref, &format!("/api/jobs/{}/result", job.id));
        }
        other => panic!("expected done event, got {:?}", other),
    }

    // Progress reported through state events never regresses
    let progresses: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::State { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert!(progresses.windows(2).all(|w| w[0] <= w[1]), "{:?}", progresses);

    // Terminal state is visible through the polling path too
    let done = wait_until(&service, job.id, |j| j.state == JobState::Done, Duration::from_secs(2)).await;
    assert_eq!(done.progress, 100);
    assert!(done.stage.is_none());
    assert!(done.result_ref().is_some());

    // And the artifact is readable
    let artifact = service.result(job.id).await.unwrap();
    assert_eq!(artifact["summary"], "ok");

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_submissions_never_create_a_job() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::start(
        fast_config(dir.path()),
        Arc::new(OkDocuments),
        Arc::new(InstantAnalyzer::new()),
    )
    .await
    .unwrap();

    // Both variants set
    let err = service
        .submit(SubmitRequest {
            document_ref: Some("a".into()),
            remote_url: Some("https://arxiv.org/x.pdf".into()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Neither variant set
    let err = service.submit(SubmitRequest::default()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Malformed URL
    let err = service
        .submit(SubmitRequest::for_url("not-a-url"))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert!(service.list().is_empty());
    assert_eq!(service.stats().total_jobs, 0);

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn full_queue_rejects_submissions_fast() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path());
    config.queue.capacity = 2;
    config.queue.workers = 1;

    let gate = Arc::new(Semaphore::new(0));
    let analyzer = Arc::new(GatedAnalyzer::new(gate.clone()));
    let service = JobService::start(config, Arc::new(OkDocuments), analyzer.clone())
        .await
        .unwrap();

    // First job occupies the single worker at the analyzer gate
    let running = service.submit(SubmitRequest::for_document("running")).unwrap();
    wait_until(
        &service,
        running.id,
        |j| j.state == JobState::Processing,
        Duration::from_secs(2),
    )
    .await;

    // Two more fill the queue, the fourth is rejected immediately
    let queued_a = service.submit(SubmitRequest::for_document("queued-a")).unwrap();
    let queued_b = service.submit(SubmitRequest::for_document("queued-b")).unwrap();
    let err = service
        .submit(SubmitRequest::for_document("rejected"))
        .unwrap_err();
    assert!(matches!(err, Error::Saturated));

    // The rejected submission left no record behind
    assert_eq!(service.stats().total_jobs, 3);

    // Once the gate opens, everything admitted completes
    gate.add_permits(16);
    for id in [running.id, queued_a.id, queued_b.id] {
        wait_until(&service, id, |j| j.state == JobState::Done, Duration::from_secs(5)).await;
    }

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn terminal_status_and_result_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::start(
        fast_config(dir.path()),
        Arc::new(OkDocuments),
        Arc::new(InstantAnalyzer::new()),
    )
    .await
    .unwrap();

    let job = service.submit(SubmitRequest::for_document("paper-1")).unwrap();
    wait_until(&service, job.id, |j| j.state == JobState::Done, Duration::from_secs(5)).await;

    let first = service.status(job.id).unwrap();
    let second = service.status(job.id).unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.result_ref(), second.result_ref());
    assert_eq!(first.progress, second.progress);

    let artifact_a = service.result(job.id).await.unwrap();
    let artifact_b = service.result(job.id).await.unwrap();
    assert_eq!(artifact_a, artifact_b);

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn result_before_completion_is_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let service = JobService::start(
        fast_config(dir.path()),
        Arc::new(OkDocuments),
        Arc::new(GatedAnalyzer::new(gate.clone())),
    )
    .await
    .unwrap();

    let job = service.submit(SubmitRequest::for_document("paper-1")).unwrap();
    let err = service.result(job.id).await.unwrap_err();
    assert!(matches!(err, Error::NotReady(_)));

    gate.add_permits(1);
    wait_until(&service, job.id, |j| j.state == JobState::Done, Duration::from_secs(5)).await;
    assert!(service.result(job.id).await.is_ok());

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_ids_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = JobService::start(
        fast_config(dir.path()),
        Arc::new(OkDocuments),
        Arc::new(InstantAnalyzer::new()),
    )
    .await
    .unwrap();

    let id = uuid::Uuid::new_v4();
    assert!(matches!(service.status(id), Err(Error::NotFound(_))));
    assert!(matches!(service.result(id).await, Err(Error::NotFound(_))));
    assert!(matches!(service.cancel(id), Err(Error::NotFound(_))));
    assert!(matches!(service.subscribe(id), Err(Error::NotFound(_))));

    service.shutdown();
}
