//! Development analyzer that walks the pipeline without a model backend
//!
//! Steps through the real stage sequence with configurable pacing and
//! produces a stub artifact, so the server runs end-to-end before a real
//! analyzer is wired in.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::{AnalysisError, AnalysisRequest, AnalyzerProvider, FetchedDocument, ProgressSink};

/// Stage labels and the progress each reports, after the fetch stage
const STAGES: &[(&str, u8)] = &[
    ("parsing", 25),
    ("analyzing", 60),
    ("finalizing", 90),
];

/// Pipeline walkthrough analyzer for development and demos
pub struct SimulatedAnalyzer {
    step_delay: Duration,
}

impl SimulatedAnalyzer {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

impl Default for SimulatedAnalyzer {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl AnalyzerProvider for SimulatedAnalyzer {
    async fn run(
        &self,
        document: &FetchedDocument,
        request: &AnalysisRequest,
        progress: ProgressSink<'_>,
    ) -> Result<serde_json::Value, AnalysisError> {
        for (stage, pct) in STAGES {
            progress(stage, *pct);
            tokio::time::sleep(self.step_delay).await;
        }

        Ok(json!({
            "analysis_kind": request.kind.as_str(),
            "document": {
                "name": document.name,
                "size_bytes": document.bytes.len(),
                "content_hash": document.content_hash,
            },
            "query": request.query,
            "sections": [],
            "summary": format!(
                "Simulated {} analysis of '{}'",
                request.kind.as_str(),
                document.name
            ),
        }))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
