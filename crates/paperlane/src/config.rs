//! Configuration for the job orchestration service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Queue sizing and worker pool
    #[serde(default)]
    pub queue: QueueConfig,
    /// Per-stage execution limits
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Retry and backoff policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Liveness reaping and terminal-job retention
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Remote document fetching constraints
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Event channel sizing
    #[serde(default)]
    pub events: EventsConfig,
    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Terminal-state webhook delivery
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl JobsConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable permissive CORS (browser extensions need this)
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MB, submissions are JSON only
        }
    }
}

/// Queue sizing and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Bounded queue capacity; submissions beyond this are rejected fast
    pub capacity: usize,
    /// Fixed number of concurrent workers
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            workers: 4,
        }
    }
}

/// Per-stage execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Timeout for resolving/fetching the document, per attempt
    pub fetch_timeout_secs: u64,
    /// Timeout for one analyzer run, per attempt
    pub analyze_timeout_secs: u64,
    /// How often a busy worker touches its job so the reaper knows it lives
    pub heartbeat_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            analyze_timeout_secs: 300, // 5 minutes, model inference dominates
            heartbeat_secs: 5,
        }
    }
}

impl ProcessingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

/// Retry and backoff policy for transient failures
///
/// The delay for attempt `n` grows as `base * multiplier^(n-1)`, clamped to
/// `max_delay_ms`, plus uniform jitter of up to `jitter * delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempt budget per job, shared between worker retries and
    /// reaper requeues
    pub max_attempts: u32,
    /// First retry delay in milliseconds
    pub base_delay_ms: u64,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Upper bound on the computed delay
    pub max_delay_ms: u64,
    /// Jitter fraction in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: 0.25,
        }
    }
}

/// Liveness reaping and terminal-job retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// A processing job untouched for this long is presumed orphaned
    pub liveness_threshold_secs: u64,
    /// How often the liveness reaper scans
    pub reaper_interval_secs: u64,
    /// How long terminal jobs (and their artifacts) are kept
    pub job_ttl_secs: u64,
    /// How often the retention sweep runs
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            liveness_threshold_secs: 60,
            reaper_interval_secs: 15,
            job_ttl_secs: 24 * 3600,
            sweep_interval_secs: 300,
        }
    }
}

impl RetentionConfig {
    pub fn liveness_threshold(&self) -> Duration {
        Duration::from_secs(self.liveness_threshold_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Remote document fetching constraints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Domains remote URLs may point at; empty list allows any domain.
    /// A URL matches when its host equals an entry or is a subdomain of one.
    pub allowed_domains: Vec<String>,
    /// Maximum accepted document size in bytes
    pub max_document_bytes: u64,
    /// HTTP request timeout for a fetch
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["arxiv.org".to_string(), "export.arxiv.org".to_string()],
            max_document_bytes: 50 * 1024 * 1024, // 50MB
            request_timeout_secs: 30,
        }
    }
}

/// Event channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer per job channel
    pub channel_capacity: usize,
    /// Recent events replayed to late subscribers
    pub replay_buffer: usize,
    /// Delay before a terminated channel is torn down, so slow subscribers
    /// still observe the close
    pub teardown_grace_secs: u64,
    /// SSE keep-alive interval
    pub keep_alive_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            replay_buffer: 16,
            teardown_grace_secs: 5,
            keep_alive_secs: 15,
        }
    }
}

impl EventsConfig {
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_secs(self.teardown_grace_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

/// On-disk layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the database, uploads, and result artifacts
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    /// SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("jobs.db")
    }

    /// Directory holding uploaded documents, addressed by document ref
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory holding terminal artifacts, one JSON file per job
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }
}

/// Terminal-state webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// HTTP request timeout for a single delivery attempt
    pub request_timeout_secs: u64,
    /// Retry delays in seconds between failed attempts
    pub retry_delays_secs: Vec<u64>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            retry_delays_secs: vec![1, 2, 4],
        }
    }
}
