// crates/server/src/asr.rs
//! ASR collaborator — spawns an external recognizer CLI and parses its JSON
//! output.
//!
//! The engine only needs something implementing `Transcriber`; this module
//! provides the production implementation (an external CLI such as
//! whisper-cli invoked per job) plus the per-job scratch-directory cleanup.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use voxscribe_core::{JobError, JobId, JobParams, TranscriptResult, TranscriptSegment};
use voxscribe_engine::{CancelFlag, Cleanup, Transcriber};

/// How often the child process is checked for exit and the cancel flag is
/// polled.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Transcriber that shells out to an external ASR binary.
///
/// Command line: `{program} --input {path} --language {lang} --output-format
/// json [--hotwords w1,w2]`. The child's stdout must be a JSON object with a
/// `segments` array. Cancellation kills the child.
pub struct CommandTranscriber {
    program: String,
    poll_interval: Duration,
}

impl CommandTranscriber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            poll_interval: POLL_INTERVAL,
        }
    }

    fn build_args(&self, input: &Path, params: &JobParams) -> Vec<String> {
        let mut args = vec![
            "--input".to_string(),
            input.display().to_string(),
            "--language".to_string(),
            params.language.clone(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if !params.hotwords.is_empty() {
            args.push("--hotwords".to_string());
            args.push(params.hotwords.join(","));
        }
        args
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(
        &self,
        input: &Path,
        params: &JobParams,
        cancel: &CancelFlag,
    ) -> Result<TranscriptResult, JobError> {
        let args = self.build_args(input, params);
        tracing::info!(program = %self.program, input = %input.display(), "Spawning ASR process");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JobError::Processing(format!("failed to spawn {}: {e}", self.program)))?;

        // Drain the pipes on their own threads so a chatty child never
        // blocks on a full pipe while we poll for exit.
        let stdout_reader = spawn_pipe_reader(child.stdout.take());
        let stderr_reader = spawn_pipe_reader(child.stderr.take());

        let status = loop {
            if cancel.is_cancelled() {
                tracing::info!(program = %self.program, "Killing ASR process on cancellation");
                if let Err(e) = child.kill() {
                    tracing::warn!(error = %e, "Failed to kill ASR process");
                }
                let _ = child.wait();
                return Err(JobError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(self.poll_interval),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(JobError::Processing(format!(
                        "failed to poll ASR process: {e}"
                    )));
                }
            }
        };

        let stdout = stdout_reader
            .join()
            .map_err(|_| JobError::Processing("stdout reader panicked".into()))?
            .unwrap_or_default();
        let stderr = stderr_reader
            .join()
            .map_err(|_| JobError::Processing("stderr reader panicked".into()))?
            .unwrap_or_default();

        if !status.success() {
            let summary: String = stderr.chars().take(500).collect();
            tracing::error!(
                exit_code = ?status.code(),
                stderr = %summary,
                "ASR process exited with failure"
            );
            return Err(JobError::Processing(format!(
                "recognizer exited with {status}: {summary}"
            )));
        }

        parse_output(&stdout)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<Option<String>> {
    std::thread::spawn(move || {
        let mut pipe = pipe?;
        let mut buf = String::new();
        match pipe.read_to_string(&mut buf) {
            Ok(_) => Some(buf),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read ASR process pipe");
                None
            }
        }
    })
}

// -- CLI output format -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    segments: Vec<CliSegment>,
}

#[derive(Debug, Deserialize)]
struct CliSegment {
    #[serde(default)]
    speaker: Option<CliSpeaker>,
    text: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
}

/// Recognizers report speakers either as numeric ids or string labels.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CliSpeaker {
    Id(i64),
    Label(String),
}

impl CliSpeaker {
    fn key(&self) -> String {
        match self {
            CliSpeaker::Id(id) => id.to_string(),
            CliSpeaker::Label(label) => label.clone(),
        }
    }
}

/// Parse the recognizer's JSON stdout into a transcript.
///
/// Raw speaker ids are renumbered by first appearance so callers always see
/// "Speaker 1", "Speaker 2", … regardless of how the recognizer labels them.
/// Segments without speaker information all collapse onto "Speaker 1".
fn parse_output(stdout: &str) -> Result<TranscriptResult, JobError> {
    let output: CliOutput = serde_json::from_str(stdout)
        .map_err(|e| JobError::Processing(format!("recognizer returned invalid JSON: {e}")))?;

    let mut speaker_numbers: HashMap<String, usize> = HashMap::new();
    let mut segments = Vec::with_capacity(output.segments.len());
    for raw in output.segments {
        let key = raw
            .speaker
            .as_ref()
            .map(CliSpeaker::key)
            .unwrap_or_else(|| "0".to_string());
        let next = speaker_numbers.len() + 1;
        let number = *speaker_numbers.entry(key).or_insert(next);
        segments.push(TranscriptSegment {
            speaker: format!("Speaker {number}"),
            text: raw.text,
            start_secs: raw.start,
            end_secs: raw.end,
        });
    }
    Ok(TranscriptResult { segments })
}

// -- Scratch directory cleanup -----------------------------------------------

/// Per-job scratch space under a common root, removed on every terminal
/// path.
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory reserved for one job's intermediate files.
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }
}

impl Cleanup for JobWorkspace {
    fn cleanup(&self, job_id: &JobId) -> io::Result<()> {
        let dir = self.job_dir(job_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, dir = %dir.display(), "Removed job scratch dir");
                Ok(())
            }
            // Nothing was written for this job.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
