//! Shared fixtures for the integration suites
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use paperlane::config::{JobsConfig, RetryConfig};
use paperlane::providers::{
    AnalysisError, AnalysisRequest, AnalyzerProvider, DocumentProvider, FetchedDocument,
    ProgressSink,
};
use paperlane::types::{Job, JobEvent, JobSource};
use paperlane::JobService;

/// Config with test-friendly timings: fast retries, idle background loops
pub fn fast_config(dir: &Path) -> JobsConfig {
    let mut config = JobsConfig::default();
    config.storage.data_dir = dir.to_path_buf();
    config.queue.capacity = 16;
    config.queue.workers = 2;
    config.processing.fetch_timeout_secs = 5;
    config.processing.analyze_timeout_secs = 5;
    config.processing.heartbeat_secs = 1;
    config.retry = RetryConfig {
        max_attempts: 5,
        base_delay_ms: 10,
        multiplier: 1.5,
        max_delay_ms: 50,
        jitter: 0.0,
    };
    // Background loops stay out of the way unless a test opts in
    config.retention.liveness_threshold_secs = 3600;
    config.retention.reaper_interval_secs = 3600;
    config.retention.job_ttl_secs = 3600;
    config.retention.sweep_interval_secs = 3600;
    config.events.teardown_grace_secs = 1;
    config.fetch.allowed_domains = vec!["arxiv.org".to_string()];
    config
}

/// A document provider that always resolves instantly
pub struct OkDocuments;

#[async_trait]
impl DocumentProvider for OkDocuments {
    async fn resolve(&self, source: &JobSource) -> Result<FetchedDocument, AnalysisError> {
        Ok(FetchedDocument {
            name: format!("{}.pdf", source.value()),
            bytes: b"%PDF-1.7 test".to_vec(),
            content_hash: "test-hash".to_string(),
        })
    }

    fn name(&self) -> &str {
        "ok-documents"
    }
}

/// A document provider that waits for a gate permit before resolving
pub struct GatedDocuments {
    pub gate: Arc<Semaphore>,
}

#[async_trait]
impl DocumentProvider for GatedDocuments {
    async fn resolve(&self, source: &JobSource) -> Result<FetchedDocument, AnalysisError> {
        let _permit = self.gate.acquire().await.unwrap();
        Ok(FetchedDocument {
            name: format!("{}.pdf", source.value()),
            bytes: b"%PDF-1.7 test".to_vec(),
            content_hash: "test-hash".to_string(),
        })
    }

    fn name(&self) -> &str {
        "gated-documents"
    }
}

/// A document provider that fails a scripted number of times first
pub struct FlakyDocuments {
    pub remaining_failures: AtomicU32,
    pub error: AnalysisError,
}

impl FlakyDocuments {
    pub fn new(failures: u32, error: AnalysisError) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            error,
        }
    }
}

#[async_trait]
impl DocumentProvider for FlakyDocuments {
    async fn resolve(&self, source: &JobSource) -> Result<FetchedDocument, AnalysisError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        Ok(FetchedDocument {
            name: format!("{}.pdf", source.value()),
            bytes: b"%PDF-1.7 test".to_vec(),
            content_hash: "test-hash".to_string(),
        })
    }

    fn name(&self) -> &str {
        "flaky-documents"
    }
}

/// Analyzer that walks the stages instantly and succeeds
pub struct InstantAnalyzer {
    pub runs: AtomicU32,
}

impl InstantAnalyzer {
    pub fn new() -> Self {
        Self {
            runs: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AnalyzerProvider for InstantAnalyzer {
    async fn run(
        &self,
        document: &FetchedDocument,
        _request: &AnalysisRequest,
        progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        progress("parsing", 25);
        progress("analyzing", 60);
        progress("finalizing", 90);
        Ok(serde_json::json!({ "summary": "ok", "document": document.name }))
    }

    fn name(&self) -> &str {
        "instant"
    }
}

/// Analyzer that fails a scripted number of times before succeeding
pub struct FlakyAnalyzer {
    pub remaining_failures: AtomicU32,
    pub error: AnalysisError,
    pub runs: AtomicU32,
}

impl FlakyAnalyzer {
    pub fn new(failures: u32, error: AnalysisError) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            error,
            runs: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AnalyzerProvider for FlakyAnalyzer {
    async fn run(
        &self,
        _document: &FetchedDocument,
        _request: &AnalysisRequest,
        progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        progress("parsing", 25);
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        progress("analyzing", 60);
        progress("finalizing", 90);
        Ok(serde_json::json!({ "summary": "ok after retries" }))
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Analyzer that waits for a gate permit before succeeding
pub struct GatedAnalyzer {
    pub gate: Arc<Semaphore>,
    pub runs: AtomicU32,
}

impl GatedAnalyzer {
    pub fn new(gate: Arc<Semaphore>) -> Self {
        Self {
            gate,
            runs: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AnalyzerProvider for GatedAnalyzer {
    async fn run(
        &self,
        _document: &FetchedDocument,
        _request: &AnalysisRequest,
        progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        progress("analyzing", 50);
        let _permit = self.gate.acquire().await.unwrap();
        progress("finalizing", 90);
        Ok(serde_json::json!({ "summary": "ok" }))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Analyzer whose first run hangs forever; later runs succeed instantly.
/// With heartbeats configured far apart, the hung first run looks exactly
/// like a worker that died mid-job.
pub struct HangFirstAnalyzer {
    pub runs: AtomicU32,
}

impl HangFirstAnalyzer {
    pub fn new() -> Self {
        Self {
            runs: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AnalyzerProvider for HangFirstAnalyzer {
    async fn run(
        &self,
        _document: &FetchedDocument,
        _request: &AnalysisRequest,
        progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        if run == 0 {
            std::future::pending::<()>().await;
        }
        progress("analyzing", 60);
        Ok(serde_json::json!({ "summary": "recovered" }))
    }

    fn name(&self) -> &str {
        "hang-first"
    }
}

/// Analyzer that never returns
pub struct HangingAnalyzer;

#[async_trait]
impl AnalyzerProvider for HangingAnalyzer {
    async fn run(
        &self,
        _document: &FetchedDocument,
        _request: &AnalysisRequest,
        _progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// Poll job status until the predicate holds or the timeout elapses
pub async fn wait_until<F>(service: &JobService, id: Uuid, pred: F, timeout: Duration) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(job) = service.status(id) {
            if pred(&job) {
                return job;
            }
        }
        if tokio::time::Instant::now() > deadline {
            let state = service
                .status(id)
                .map(|j| format!("{:?}", j))
                .unwrap_or_else(|_| "<gone>".to_string());
            panic!("timed out waiting for job {}; last state: {}", id, state);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain an event stream until the terminal event (or timeout)
pub async fn collect_events(
    mut stream: futures::stream::BoxStream<'static, JobEvent>,
    timeout: Duration,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(event)) => {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
    events
}

/// Collapse exact consecutive duplicates (replay/live seams are
/// at-least-once by design)
pub fn dedup_consecutive(events: Vec<JobEvent>) -> Vec<JobEvent> {
    let mut out: Vec<JobEvent> = Vec::new();
    for event in events {
        if out.last() != Some(&event) {
            out.push(event);
        }
    }
    out
}
