//! Failure classification: retries, permanent errors, and policy rejections

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use paperlane::providers::AnalysisError;
use paperlane::types::{codes, JobEvent, JobState, SubmitRequest};
use paperlane::JobService;

#[tokio::test(flavor = "multi_thread")]
async fn disallowed_domain_fails_without_retries() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());

    // Real document store so the allow-list actually runs
    let documents = Arc::new(paperlane::providers::DocumentStore::new(
        config.storage.uploads_dir(),
        config.fetch.clone(),
    ));
    let analyzer = Arc::new(InstantAnalyzer::new());
    let service = JobService::start(config, documents, analyzer.clone())
        .await
        .unwrap();

    let job = service
        .submit(SubmitRequest::for_url("https://evil.example.com/paper.pdf"))
        .unwrap();

    let failed = wait_until(
        &service,
        job.id,
        |j| j.state == JobState::Error,
        Duration::from_secs(5),
    )
    .await;

    let error = failed.error.unwrap();
    assert_eq!(error.code, codes::DOMAIN_NOT_ALLOWED);
    // Permanent failure: no retry attempts were consumed
    assert_eq!(failed.attempts, 0);
    // The analyzer never ran
    assert_eq!(analyzer.runs.load(Ordering::SeqCst), 0);
    // And no artifact was produced
    assert!(failed.result_path.is_none());

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_retry_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer = Arc::new(FlakyAnalyzer::new(
        3,
        AnalysisError::transient("upstream-overloaded", "inference backend busy"),
    ));
    let service = JobService::start(fast_config(dir.path()), Arc::new(OkDocuments), analyzer.clone())
        .await
        .unwrap();

    let job = service.submit(SubmitRequest::for_document("paper-1")).unwrap();
    let stream = service.subscribe(job.id).unwrap();

    let done = wait_until(
        &service,
        job.id,
        |j| j.state == JobState::Done,
        Duration::from_secs(10),
    )
    .await;

    // Three failures then success, within the budget of five
    assert_eq!(analyzer.runs.load(Ordering::SeqCst), 4);
    assert_eq!(done.attempts, 3);
    assert_eq!(done.progress, 100);

    let events = collect_events(stream, Duration::from_secs(2)).await;

    // Retries surface as log events, not state regressions
    let retries = events
        .iter()
        .filter(|e| matches!(e, JobEvent::Log { .. }))
        .count();
    assert!(retries >= 3, "expected retry logs, got {:?}", events);

    let progresses: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::State { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert!(
        progresses.windows(2).all(|w| w[0] <= w[1]),
        "progress regressed: {:?}",
        progresses
    );

    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_analyzer_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer = Arc::new(FlakyAnalyzer::new(
        u32::MAX,
        AnalysisError::permanent("model-rejected", "document has no extractable text"),
    ));
    let service = JobService::start(fast_config(dir.path()), Arc::new(OkDocuments), analyzer.clone())
        .await
        .unwrap();

    let job = service.submit(SubmitRequest::for_document("paper-1")).unwrap();
    let failed = wait_until(
        &service,
        job.id,
        |j| j.state == JobState::Error,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(analyzer.runs.load(Ordering::SeqCst), 1);
    assert_eq!(failed.attempts, 0);
    let error = failed.error.unwrap();
    assert_eq!(error.code, "model-rejected");
    assert_eq!(error.message, "document has no extractable text");

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_attempt_budget_becomes_terminal_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path());
    config.retry.max_attempts = 2;

    let analyzer = Arc::new(FlakyAnalyzer::new(
        u32::MAX,
        AnalysisError::transient("upstream-overloaded", "inference backend busy"),
    ));
    let service = JobService::start(config, Arc::new(OkDocuments), analyzer.clone())
        .await
        .unwrap();

    let job = service.submit(SubmitRequest::for_document("paper-1")).unwrap();
    let failed = wait_until(
        &service,
        job.id,
        |j| j.state == JobState::Error,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(failed.attempts, 2);
    let error = failed.error.unwrap();
    assert_eq!(error.code, "upstream-overloaded");
    assert!(error.message.contains("gave up after 2 attempts"));
    // Budget of two means two runs total: the original and one retry
    assert_eq!(analyzer.runs.load(Ordering::SeqCst), 2);

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_fetch_failures_also_retry() {
    let dir = tempfile::tempdir().unwrap();
    let documents = Arc::new(FlakyDocuments::new(
        2,
        AnalysisError::transient(codes::FETCH_FAILED, "connection reset"),
    ));
    let service = JobService::start(
        fast_config(dir.path()),
        documents,
        Arc::new(InstantAnalyzer::new()),
    )
    .await
    .unwrap();

    let job = service.submit(SubmitRequest::for_document("paper-1")).unwrap();
    let done = wait_until(
        &service,
        job.id,
        |j| j.state == JobState::Done,
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(done.attempts, 2);

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_document_ref_is_a_permanent_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    let documents = Arc::new(paperlane::providers::DocumentStore::new(
        config.storage.uploads_dir(),
        config.fetch.clone(),
    ));
    let service = JobService::start(config, documents, Arc::new(InstantAnalyzer::new()))
        .await
        .unwrap();

    let job = service.submit(SubmitRequest::for_document("no-such-doc")).unwrap();
    let failed = wait_until(
        &service,
        job.id,
        |j| j.state == JobState::Error,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(failed.error.unwrap().code, codes::DOCUMENT_NOT_FOUND);
    assert_eq!(failed.attempts, 0);

    service.shutdown();
}
