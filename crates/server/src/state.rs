// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use voxscribe_engine::{Dispatcher, JobRegistry, StatusHub};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// The job orchestration engine.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wrap a dispatcher in shared application state.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            dispatcher,
        })
    }

    /// Job state store.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.dispatcher.registry()
    }

    /// Status broadcast hub.
    pub fn hub(&self) -> &Arc<StatusHub> {
        self.dispatcher.hub()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
