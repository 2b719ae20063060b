// crates/engine/src/hub.rs
//! Deduplicating status broadcast hub.
//!
//! Fan-out uses a bounded `tokio::sync::broadcast` channel: publishing never
//! blocks, delivery is at-most-once per connected subscriber in publish
//! order, and a subscriber that falls behind loses the oldest events instead
//! of stalling job progress.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use voxscribe_core::{JobId, JobStatus, StatusUpdate};

/// Broadcast buffer per subscriber. Long jobs emit ~one event per
/// percentage point, so this covers several jobs of backlog.
const CHANNEL_CAPACITY: usize = 256;

/// Pub/sub hub for job status updates with per-job deduplication.
pub struct StatusHub {
    tx: broadcast::Sender<StatusUpdate>,
    /// Last published (status, progress) per job, dropped on terminal
    /// publish so memory stays bounded by the number of in-flight jobs.
    last_seen: Mutex<HashMap<JobId, (JobStatus, u8)>>,
}

impl StatusHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to updates for all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    /// Subscribe to updates for a single job.
    pub fn subscribe_job(&self, job_id: JobId) -> JobUpdates {
        JobUpdates {
            job_id,
            rx: self.tx.subscribe(),
        }
    }

    /// Publish a status update unless it is redundant.
    ///
    /// An update goes out when progress strictly increased, the status
    /// changed, or the status is terminal — terminal events are never
    /// suppressed. Everything else is dropped so coarse progress sources
    /// cannot flood subscribers.
    pub fn publish(&self, job_id: JobId, status: JobStatus, progress: u8, message: impl Into<String>) {
        let mut last_seen = match self.last_seen.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::error!("Mutex poisoned publishing status: {e}");
                return;
            }
        };

        let should_send = match last_seen.get(&job_id) {
            Some(&(last_status, last_progress)) => {
                progress > last_progress || status != last_status || status.is_terminal()
            }
            None => true,
        };
        if !should_send {
            return;
        }

        if status.is_terminal() {
            last_seen.remove(&job_id);
        } else {
            last_seen.insert(job_id, (status, progress));
        }

        // Send while still holding the dedup lock so racing publishers
        // cannot reorder events for the same job. A send with no
        // subscribers is fine.
        let _ = self.tx.send(StatusUpdate {
            job_id,
            status,
            progress,
            message: message.into(),
        });
    }

    /// Forget the dedup state for a job. Called at resubmission so the new
    /// progress sequence's low values are not swallowed by the stale
    /// high-water mark.
    pub fn reset(&self, job_id: &JobId) {
        match self.last_seen.lock() {
            Ok(mut guard) => {
                guard.remove(job_id);
            }
            Err(e) => tracing::error!("Mutex poisoned resetting status: {e}"),
        }
    }

    /// Number of jobs with live dedup state (diagnostics).
    pub fn tracked_jobs(&self) -> usize {
        self.last_seen.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription filtered to a single job.
pub struct JobUpdates {
    job_id: JobId,
    rx: broadcast::Receiver<StatusUpdate>,
}

impl JobUpdates {
    /// Receive the next update for this job, skipping others. Returns `None`
    /// once the hub is gone.
    pub async fn recv(&mut self) -> Option<StatusUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) if update.job_id == self.job_id => return Some(update),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(job_id = %self.job_id, missed, "Subscriber lagging, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
