//! Job submission, status, streaming, result, and cancellation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::request::SubmitRequest;
use crate::types::response::{
    JobListResponse, JobStatusResponse, JobSummary, SubmitResponse,
};

/// POST /api/jobs - Submit a document for analysis
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let job = state.service().submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse::from(&job))))
}

/// GET /api/jobs/:id - Poll job status
///
/// Safe at any frequency; reads only the job record and reflects the same
/// data the event stream delivers.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>> {
    let job = state.service().status(job_id)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// GET /api/jobs/:id/events - Follow a job's progress over SSE
///
/// Replays the last known state first, then streams live events until the
/// terminal event. Clients that lose the connection simply reconnect and
/// get the replay again.
pub async fn stream_job_events(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let events = state.service().subscribe(job_id)?;
    let keep_alive = state.config().events.keep_alive();

    let sse_stream = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive")))
}

/// GET /api/jobs/:id/result - Fetch the artifact of a completed job
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let artifact = state.service().result(job_id).await?;
    Ok(Json(artifact))
}

/// DELETE /api/jobs/:id - Best-effort cancellation
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>> {
    let job = state.service().cancel(job_id)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// GET /api/jobs - List all jobs and queue statistics
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let service = state.service();
    let jobs: Vec<JobSummary> = service.list().iter().map(JobSummary::from).collect();
    let stats = service.stats();
    Json(JobListResponse { jobs, stats })
}
