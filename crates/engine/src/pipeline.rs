// crates/engine/src/pipeline.rs
//! The job body: phase plan driven through the progress estimator.
//!
//! Three phases cover a job's progress scale. `prepare` verifies the input,
//! `transcribe` is the long opaque ASR call, `finalize` post-processes the
//! transcript. The cancel flag is checked before each phase; the ASR
//! collaborator polls it internally.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use voxscribe_core::{JobError, JobId, JobParams, TranscriptResult};

use crate::cancel::CancelFlag;
use crate::estimator::ProgressEstimator;
use crate::hub::StatusHub;
use crate::registry::JobRegistry;
use crate::transcriber::Transcriber;

/// Progress reached when the input is prepared.
const PREPARE_END: u8 = 10;
/// Progress reached when recognition finishes.
const TRANSCRIBE_END: u8 = 85;

/// Execute one job to a result or error. The caller (dispatcher worker)
/// owns the terminal registry transition and the cleanup call.
pub(crate) async fn run_job(
    registry: Arc<JobRegistry>,
    hub: Arc<StatusHub>,
    transcriber: Arc<dyn Transcriber>,
    job_id: JobId,
    input: PathBuf,
    params: JobParams,
    cancel: CancelFlag,
) -> Result<TranscriptResult, JobError> {
    let estimator = ProgressEstimator::new(job_id, registry, hub);
    let outcome = execute(&estimator, transcriber, job_id, input, params, &cancel).await;
    if outcome.is_err() {
        // No progress illusion on failure or cancellation.
        estimator.stop();
    }
    outcome
}

async fn execute(
    estimator: &ProgressEstimator,
    transcriber: Arc<dyn Transcriber>,
    job_id: JobId,
    input: PathBuf,
    params: JobParams,
    cancel: &CancelFlag,
) -> Result<TranscriptResult, JobError> {
    checkpoint(cancel)?;
    estimator.start_phase("prepare", "Preparing audio", 0, PREPARE_END, Duration::from_secs(2));
    let meta = tokio::fs::metadata(&input)
        .await
        .map_err(|e| JobError::Processing(format!("audio file unavailable: {e}")))?;
    if !meta.is_file() {
        return Err(JobError::Processing(format!(
            "input is not a file: {}",
            input.display()
        )));
    }
    estimator.complete_phase().await;

    checkpoint(cancel)?;
    estimator.start_phase(
        "transcribe",
        "Recognizing speech",
        PREPARE_END,
        TRANSCRIBE_END,
        transcribe_estimate(params.duration_hint_secs),
    );
    tracing::debug!(job_id = %job_id, transcriber = transcriber.name(), "Invoking transcriber");
    let mut result = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || transcriber.transcribe(&input, &params, &cancel))
            .await
            .map_err(|e| JobError::Processing(format!("transcription task panicked: {e}")))??
    };
    checkpoint(cancel)?;
    estimator.complete_phase().await;

    estimator.start_phase(
        "finalize",
        "Finalizing transcript",
        TRANSCRIBE_END,
        100,
        Duration::from_secs(1),
    );
    result.merge_consecutive();
    estimator.complete_phase().await;

    Ok(result)
}

fn checkpoint(cancel: &CancelFlag) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        Err(JobError::Cancelled)
    } else {
        Ok(())
    }
}

/// Estimate how long recognition will take. Rule of thumb carried over from
/// production measurements: roughly 15% of the audio duration, never under
/// five seconds. Without a duration hint, assume half a minute.
fn transcribe_estimate(duration_hint_secs: Option<f64>) -> Duration {
    match duration_hint_secs {
        Some(secs) if secs > 0.0 => Duration::from_secs_f64((secs * 0.15).max(5.0)),
        _ => Duration::from_secs(30),
    }
}
