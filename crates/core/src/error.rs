// crates/core/src/error.rs
use crate::types::{JobId, JobStatus};
use thiserror::Error;

/// Errors produced by the job orchestration layer.
///
/// `Cancelled` is not a failure from the system's point of view — it maps to
/// the terminal `cancelled` status. `NotFound` is advisory: the job may have
/// been removed concurrently and callers are expected to discard the
/// operation. `InvalidTransition` indicates a caller bug or a lost race
/// against an already-terminal job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job was cancelled")]
    Cancelled,

    #[error("transcription failed: {0}")]
    Processing(String),

    #[error("job timed out after {0}s")]
    Timeout(u64),
}

impl JobError {
    /// Whether this error represents a cooperative cancellation rather than
    /// a processing failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}
