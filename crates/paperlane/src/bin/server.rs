//! Job server binary
//!
//! Run with: cargo run -p paperlane --bin paperlane-server

use std::sync::Arc;
use std::time::Duration;

use paperlane::config::JobsConfig;
use paperlane::providers::SimulatedAnalyzer;
use paperlane::server::JobServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperlane=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::var("PAPERLANE_CONFIG") {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            JobsConfig::from_file(path)?
        }
        Err(_) => JobsConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Queue capacity: {}", config.queue.capacity);
    tracing::info!("  - Workers: {}", config.queue.workers);
    tracing::info!("  - Retry budget: {} attempts", config.retry.max_attempts);
    tracing::info!("  - Data dir: {}", config.storage.data_dir.display());

    // The simulated analyzer walks the pipeline without a model backend;
    // deployments wire in a real AnalyzerProvider here.
    let analyzer = Arc::new(SimulatedAnalyzer::new(Duration::from_millis(250)));

    let server = JobServer::new(config, analyzer).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/jobs             - Submit a document for analysis");
    println!("  GET    /api/jobs             - List jobs and queue stats");
    println!("  GET    /api/jobs/:id         - Poll job status");
    println!("  GET    /api/jobs/:id/events  - Follow progress over SSE");
    println!("  GET    /api/jobs/:id/result  - Fetch the artifact");
    println!("  DELETE /api/jobs/:id         - Cancel a job");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
