// crates/server/src/routes/mod.rs
//! API route handlers for the voxscribe server.

pub mod health;
pub mod jobs;
pub mod stream;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/jobs - Submit a transcription job
/// - GET    /api/jobs - List jobs, optionally filtered by status
/// - GET    /api/jobs/{id} - Job status, optionally with the transcript
/// - POST   /api/jobs/{id}/cancel - Request cooperative cancellation
/// - POST   /api/jobs/{id}/retranscribe - Requeue a finished job
/// - POST   /api/jobs/wait - Block until the listed jobs settle
/// - DELETE /api/jobs/{id} - Remove a finished job record
/// - GET    /api/jobs/stream - SSE stream of all job status updates
/// - GET    /api/jobs/{id}/stream - SSE stream for a single job
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .nest("/api", stream::router())
        .with_state(state)
}
