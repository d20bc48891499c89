//! API routes for the job service

pub mod jobs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        // Submission
        .route(
            "/jobs",
            post(jobs::submit_job).layer(DefaultBodyLimit::max(max_body_size)),
        )
        // Job management
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job_status))
        .route("/jobs/:id", delete(jobs::cancel_job))
        .route("/jobs/:id/events", get(jobs::stream_job_events))
        .route("/jobs/:id/result", get(jobs::get_job_result))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "paperlane",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Job orchestration and progress streaming for document analysis",
        "endpoints": {
            "POST /api/jobs": "Submit a document for analysis",
            "GET /api/jobs": "List all jobs and queue stats",
            "GET /api/jobs/:id": "Poll job status",
            "GET /api/jobs/:id/events": "Follow progress over SSE",
            "GET /api/jobs/:id/result": "Fetch the artifact of a completed job",
            "DELETE /api/jobs/:id": "Best-effort cancellation"
        },
        "features": {
            "admission_control": "Bounded queue rejects overload fast instead of backlogging",
            "progress_streaming": "Per-job SSE with replay for late subscribers",
            "polling_fallback": "Status polling reflects the same data as the stream",
            "crash_recovery": "Liveness reaper requeues jobs whose worker died",
            "webhooks": "Best-effort terminal notification to a callback URL"
        }
    }))
}
