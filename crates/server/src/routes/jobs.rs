// crates/server/src/routes/jobs.rs
//! Transcription job API routes.
//!
//! - POST   /jobs                    — Submit a job
//! - GET    /jobs                    — List jobs (optional status filter)
//! - GET    /jobs/{id}               — Job status, optionally with result
//! - POST   /jobs/{id}/cancel        — Request cooperative cancellation
//! - POST   /jobs/{id}/retranscribe  — Requeue a finished job
//! - POST   /jobs/wait               — Block until listed jobs settle
//! - DELETE /jobs/{id}               — Remove a finished job record

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use voxscribe_core::{Job, JobId, JobParams, JobStatus, TranscriptResult};

/// Audio container formats the recognizer accepts.
const ALLOWED_EXTENSIONS: [&str; 7] = ["mp3", "wav", "m4a", "flac", "aac", "ogg", "wma"];

/// Upper bound for POST /jobs/wait so a caller cannot park a connection
/// forever.
const MAX_WAIT_SECS: u64 = 3600;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Request body for POST /api/jobs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Path to the audio file on the server's filesystem.
    pub input: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub hotwords: Vec<String>,
    #[serde(default)]
    pub duration_hint_secs: Option<f64>,
}

/// Response for POST /api/jobs and /retranscribe (202 Accepted).
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Job record as exposed by list/detail endpoints (without the transcript).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub input: String,
    pub status: JobStatus,
    pub progress: u8,
    pub language: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            input: job.input.display().to_string(),
            status: job.status,
            progress: job.progress,
            language: job.params.language.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error_message: job.error_message.clone(),
        }
    }
}

/// Transcript summary statistics for the detail endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptStats {
    pub speakers_count: usize,
    pub segments_count: usize,
    pub total_duration_secs: f64,
    pub speakers: Vec<String>,
}

impl TranscriptStats {
    fn from_result(result: &TranscriptResult) -> Self {
        let speakers = result.speakers();
        Self {
            speakers_count: speakers.len(),
            segments_count: result.segments.len(),
            total_duration_secs: result.total_duration_secs(),
            speakers,
        }
    }
}

/// Response for GET /api/jobs/{id}.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranscriptResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<TranscriptStats>,
}

/// Response for POST /api/jobs/{id}/cancel.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    pub accepted: bool,
}

/// Request body for POST /api/jobs/{id}/retranscribe. Absent fields keep
/// the job's previous parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetranscribeRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub hotwords: Option<Vec<String>>,
    #[serde(default)]
    pub duration_hint_secs: Option<f64>,
}

/// Request body for POST /api/jobs/wait.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitRequest {
    pub job_ids: Vec<JobId>,
    #[serde(default = "default_wait_timeout")]
    pub timeout_secs: u64,
}

fn default_wait_timeout() -> u64 {
    60
}

/// Response for POST /api/jobs/wait.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct WaitResponse {
    pub settled: bool,
    pub completed: Vec<JobId>,
    pub failed: Vec<JobId>,
    pub cancelled: Vec<JobId>,
    pub pending: Vec<JobId>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api/jobs — Submit a transcription job.
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    let input = PathBuf::from(&body.input);

    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext) => {}
        _ => {
            return Err(ApiError::BadRequest(format!(
                "unsupported audio format, supported: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
    }
    if !input.is_file() {
        return Err(ApiError::BadRequest(format!(
            "audio file not found: {}",
            input.display()
        )));
    }

    let defaults = JobParams::default();
    let params = JobParams {
        language: body.language.unwrap_or(defaults.language),
        hotwords: body.hotwords,
        duration_hint_secs: body.duration_hint_secs,
    };
    let job_id = state.dispatcher.submit(input, params);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

/// GET /api/jobs — List jobs, newest first, optionally filtered by status.
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    let filter = query.status.as_deref().map(parse_status).transpose()?;
    let mut jobs = state.registry().list(filter);
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}

fn parse_status(raw: &str) -> ApiResult<JobStatus> {
    match raw {
        "queued" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(ApiError::BadRequest(format!("unknown status: {other}"))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct DetailQuery {
    #[serde(default)]
    include_result: bool,
}

/// GET /api/jobs/{id} — Job status, optionally including the transcript.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
    Query(query): Query<DetailQuery>,
) -> ApiResult<Json<JobDetail>> {
    let job = state
        .registry()
        .get(&id)
        .ok_or(ApiError::JobNotFound(id))?;

    let (result, statistics) = match (&job.result, query.include_result) {
        (Some(result), true) => (Some(result.clone()), Some(TranscriptStats::from_result(result))),
        _ => (None, None),
    };

    Ok(Json(JobDetail {
        summary: JobSummary::from(&job),
        result,
        statistics,
    }))
}

/// POST /api/jobs/{id}/cancel — Request cooperative cancellation.
///
/// `accepted` is false when the job already finished or cancellation was
/// already requested.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<CancelResponse>> {
    if state.registry().get(&id).is_none() {
        return Err(ApiError::JobNotFound(id));
    }
    let accepted = state.dispatcher.cancel(&id);
    Ok(Json(CancelResponse { job_id: id, accepted }))
}

/// POST /api/jobs/{id}/retranscribe — Requeue a finished job on the same id.
async fn retranscribe_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
    body: Option<Json<RetranscribeRequest>>,
) -> ApiResult<impl IntoResponse> {
    let params = match body {
        None => None,
        Some(Json(overrides)) => {
            let current = state
                .registry()
                .get(&id)
                .ok_or(ApiError::JobNotFound(id))?
                .params;
            Some(JobParams {
                language: overrides.language.unwrap_or(current.language),
                hotwords: overrides.hotwords.unwrap_or(current.hotwords),
                duration_hint_secs: overrides.duration_hint_secs.or(current.duration_hint_secs),
            })
        }
    };

    state.dispatcher.resubmit(&id, params)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: id,
            status: JobStatus::Queued,
        }),
    ))
}

/// POST /api/jobs/wait — Block until all listed jobs reach a terminal state
/// or the timeout elapses. Returns the partitioned id sets either way.
async fn wait_jobs(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WaitRequest>,
) -> ApiResult<Json<WaitResponse>> {
    if body.job_ids.is_empty() {
        return Err(ApiError::BadRequest("jobIds must not be empty".to_string()));
    }
    let timeout = Duration::from_secs(body.timeout_secs.min(MAX_WAIT_SECS));
    let report = state.dispatcher.await_completion(&body.job_ids, timeout).await;
    Ok(Json(WaitResponse {
        settled: report.is_settled(),
        completed: report.completed,
        failed: report.failed,
        cancelled: report.cancelled,
        pending: report.pending,
    }))
}

/// DELETE /api/jobs/{id} — Remove a finished job record.
async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<StatusCode> {
    let job = state
        .registry()
        .get(&id)
        .ok_or(ApiError::JobNotFound(id))?;
    if job.is_active() {
        return Err(ApiError::Conflict(
            "job is still queued or running; cancel it first".to_string(),
        ));
    }
    state.registry().remove(&id);
    tracing::info!(job_id = %id, "Job record removed");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Router
// ============================================================================

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/wait", post(wait_jobs))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/jobs/{id}/retranscribe", post(retranscribe_job))
}

// ============================================================================
// Tests
// ============================================================================
