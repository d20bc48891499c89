//! Collaborator contracts: document resolution and the analyzer
//!
//! The orchestration core treats both as opaque async providers that either
//! produce a value or raise a *classified* failure. Classification is the
//! whole contract: `Transient` failures are retried by the worker under the
//! shared attempt budget, `Permanent` failures terminate the job with the
//! provider's code.

pub mod document_store;
pub mod simulated;

use async_trait::async_trait;

use crate::types::job::{AnalysisKind, JobSource};

pub use document_store::DocumentStore;
pub use simulated::SimulatedAnalyzer;

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retriable: network hiccups, upstream overload, timeouts
    Transient,
    /// Not retriable: bad input, policy violations, analyzer rejections
    Permanent,
}

/// Classified failure raised by a provider
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AnalysisError {
    pub kind: FailureKind,
    /// Stable machine-readable code surfaced to callers on terminal errors
    pub code: String,
    pub message: String,
}

impl AnalysisError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// A resolved document, ready for analysis
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Display name derived from the ref or URL
    pub name: String,
    /// Raw document bytes
    pub bytes: Vec<u8>,
    /// Hex-encoded SHA-256 of the bytes
    pub content_hash: String,
}

/// What the analyzer is asked to do
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub kind: AnalysisKind,
    pub query: Option<String>,
}

/// Progress callback handed to the analyzer
///
/// Invoked synchronously as the analyzer advances; `stage` is a free-form
/// label, `progress` an absolute percentage. The orchestrator persists and
/// fans out every invocation.
pub type ProgressSink<'a> = &'a (dyn Fn(&str, u8) + Send + Sync);

/// Resolves a job source into document bytes
///
/// Enforces size caps, timeouts, domain allow-listing, and content-type
/// validation before the analyzer ever runs.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn resolve(&self, source: &JobSource) -> Result<FetchedDocument, AnalysisError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// The document-understanding engine
///
/// One call runs one analysis to completion, reporting stages through the
/// sink. The orchestrator wraps each call in a timeout and may invoke it
/// again after transient failures.
#[async_trait]
pub trait AnalyzerProvider: Send + Sync {
    async fn run(
        &self,
        document: &FetchedDocument,
        request: &AnalysisRequest,
        progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Compute the hex SHA-256 of document bytes
pub(crate) fn content_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
