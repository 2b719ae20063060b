// crates/core/src/types.rs
//! Job records, transcript model, and status-hub wire types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Unique identifier for a transcription job.
pub type JobId = Uuid;

/// Lifecycle status of a job.
///
/// Transitions only move forward: `Queued -> Running -> {Completed, Failed,
/// Cancelled}`, plus `Queued -> Cancelled` for jobs cancelled before a worker
/// slot was acquired. [`Job::transition`] enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied transcription parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    /// Language profile passed through to the ASR collaborator
    /// (e.g. "zh", "en", "zh-en").
    #[serde(default = "default_language")]
    pub language: String,

    /// Hotwords biasing recognition toward domain vocabulary.
    #[serde(default)]
    pub hotwords: Vec<String>,

    /// Audio duration in seconds, if the caller knows it. Used to estimate
    /// how long the recognition phase will take; purely cosmetic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint_secs: Option<f64>,
}

fn default_language() -> String {
    "zh".to_string()
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            language: default_language(),
            hotwords: Vec::new(),
            duration_hint_secs: None,
        }
    }
}

/// One attributed span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub speaker: String,
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Full transcript produced by a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResult {
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptResult {
    /// Merge adjacent segments attributed to the same speaker: text is
    /// concatenated, the end time extends to cover the later segment.
    /// Reduces fragmentation in diarized output.
    pub fn merge_consecutive(&mut self) {
        if self.segments.is_empty() {
            return;
        }

        let mut merged: Vec<TranscriptSegment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            match merged.last_mut() {
                Some(last) if last.speaker == segment.speaker => {
                    last.text.push_str(&segment.text);
                    last.end_secs = segment.end_secs;
                }
                _ => merged.push(segment),
            }
        }
        self.segments = merged;
    }

    /// Distinct speakers in first-appearance order.
    pub fn speakers(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if !seen.contains(&segment.speaker) {
                seen.push(segment.speaker.clone());
            }
        }
        seen
    }

    /// End time of the final segment, in seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.segments.last().map(|s| s.end_secs).unwrap_or(0.0)
    }
}

/// Event published by the status hub to subscribers.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

/// One transcription job tracked through queued/running/terminal states.
///
/// The registry owns the canonical copy; everything handed out elsewhere is
/// a snapshot clone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub input: PathBuf,
    pub params: JobParams,
    pub status: JobStatus,
    pub progress: u8,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranscriptResult>,
}

impl Job {
    /// Create a freshly queued job with a new id.
    pub fn new(input: PathBuf, params: JobParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            params,
            status: JobStatus::Queued,
            progress: 0,
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_message: None,
            result: None,
        }
    }

    /// Whether the job currently occupies (or is waiting for) a worker slot.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Move the job forward along the state machine, stamping `started_at`
    /// or `finished_at` at the corresponding transition.
    ///
    /// Rejects everything outside `queued -> running`, `queued -> cancelled`
    /// and `running -> {completed, failed, cancelled}`. In particular, a
    /// terminal job can never transition again — a worker that observes
    /// cancellation after the job was already force-failed cannot overwrite
    /// the recorded outcome.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), JobError> {
        use JobStatus::*;
        match (self.status, to) {
            (Queued, Running) => {
                self.started_at = Some(Utc::now());
            }
            (Queued, Cancelled) | (Running, Completed) | (Running, Failed) | (Running, Cancelled) => {
                self.finished_at = Some(Utc::now());
            }
            (from, to) => return Err(JobError::InvalidTransition { from, to }),
        }
        self.status = to;
        Ok(())
    }

    /// Reset a terminal job for resubmission on the same id: back to queued,
    /// progress starts a new sequence at 0, prior outcome is discarded.
    /// Optionally replaces the transcription parameters; the input path is
    /// kept.
    pub fn reset_for_resubmit(&mut self, params: Option<JobParams>) {
        debug_assert!(self.status.is_terminal());
        if let Some(params) = params {
            self.params = params;
        }
        self.status = JobStatus::Queued;
        self.progress = 0;
        self.cancel_requested = false;
        self.started_at = None;
        self.finished_at = None;
        self.error_message = None;
        self.result = None;
    }
}
