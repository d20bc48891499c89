//! Application state for the HTTP server

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::JobsConfig;
use crate::error::Result;
use crate::providers::{AnalyzerProvider, DocumentProvider, DocumentStore};
use crate::service::JobService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: JobsConfig,
    service: Arc<JobService>,
    ready: RwLock<bool>,
}

impl AppState {
    /// Create application state with the default document store and the
    /// given analyzer
    pub async fn new(config: JobsConfig, analyzer: Arc<dyn AnalyzerProvider>) -> Result<Self> {
        let documents = Arc::new(DocumentStore::new(
            config.storage.uploads_dir(),
            config.fetch.clone(),
        ));
        Self::with_providers(config, documents, analyzer).await
    }

    /// Create application state with explicit providers
    pub async fn with_providers(
        config: JobsConfig,
        documents: Arc<dyn DocumentProvider>,
        analyzer: Arc<dyn AnalyzerProvider>,
    ) -> Result<Self> {
        let service = JobService::start(config.clone(), documents, analyzer).await?;
        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                service,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get the job service
    pub fn service(&self) -> &Arc<JobService> {
        &self.inner.service
    }

    /// Get configuration
    pub fn config(&self) -> &JobsConfig {
        &self.inner.config
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
