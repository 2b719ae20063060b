// crates/engine/src/transcriber.rs
//! Collaborator traits consumed by the engine.
//!
//! The engine never performs speech recognition itself; it drives an
//! implementation of [`Transcriber`] on a worker thread and releases
//! per-job scratch resources through [`Cleanup`].

use std::io;
use std::path::Path;

use voxscribe_core::{JobError, JobId, JobParams, TranscriptResult};

/// The speech-recognition collaborator.
///
/// `transcribe` runs on a blocking worker thread and is expected to be
/// CPU/GPU-bound. Implementations MUST poll `cancel` at reasonable
/// intervals — between decode chunks, model batches, or child-process
/// health checks — and return [`JobError::Cancelled`] promptly once the
/// flag is raised. Any other error is treated as a processing failure and
/// ends the job as `failed`.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        input: &Path,
        params: &JobParams,
        cancel: &crate::cancel::CancelFlag,
    ) -> Result<TranscriptResult, JobError>;

    /// Implementation name for logging (e.g. "whisper-cli").
    fn name(&self) -> &str;
}

/// Releases per-job scratch resources (temp audio, intermediate files).
///
/// Invoked on every terminal path — success, failure, and cancellation.
/// Failures are logged by the caller and never override the job's already
/// determined outcome.
pub trait Cleanup: Send + Sync {
    fn cleanup(&self, job_id: &JobId) -> io::Result<()>;
}

/// Cleanup collaborator for embedders whose transcriber leaves nothing
/// behind. Also handy in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCleanup;

impl Cleanup for NoopCleanup {
    fn cleanup(&self, _job_id: &JobId) -> io::Result<()> {
        Ok(())
    }
}
