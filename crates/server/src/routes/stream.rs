// crates/server/src/routes/stream.rs
//! SSE streams of job status updates.
//!
//! - GET /jobs/stream      — all jobs
//! - GET /jobs/{id}/stream — one job; the stream ends after a terminal event
//!
//! Delivery is best-effort: a subscriber that falls behind the broadcast
//! buffer misses the oldest events and keeps receiving from there.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;
use voxscribe_core::{JobId, StatusUpdate};

fn to_event(update: &StatusUpdate) -> Event {
    let json = serde_json::to_string(update).unwrap_or_default();
    Event::default().data(json)
}

/// GET /api/jobs/stream — SSE stream of all job status updates.
async fn stream_all(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.hub().subscribe();

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(update) => yield Ok(to_event(&update)),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "SSE subscriber lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream)
}

/// GET /api/jobs/{id}/stream — SSE stream for a single job.
///
/// Starts with a snapshot of the job's current state (if it exists) so late
/// subscribers are not left waiting for the next change, then follows live
/// updates until a terminal event closes the stream.
async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let snapshot = state.registry().get(&id);
    let mut updates = state.hub().subscribe_job(id);

    let stream = async_stream::stream! {
        if let Some(job) = snapshot {
            let current = StatusUpdate {
                job_id: job.id,
                status: job.status,
                progress: job.progress,
                message: String::new(),
            };
            yield Ok(to_event(&current));
            if job.status.is_terminal() {
                return;
            }
        }

        while let Some(update) = updates.recv().await {
            let terminal = update.status.is_terminal();
            yield Ok(to_event(&update));
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream)
}

/// Build the stream router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/stream", get(stream_all))
        .route("/jobs/{id}/stream", get(stream_job))
}
