// crates/engine/src/dispatcher.rs
//! Worker pool dispatcher: bounded concurrent execution, submission,
//! cancellation, resubmission, and completion waiting.
//!
//! Capacity is a semaphore with one permit per worker slot; queued jobs wait
//! for a permit in FIFO order. `submit` and `cancel` never block. The
//! worker-handle map is owned exclusively by the dispatcher and is never
//! read by job bodies.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use voxscribe_core::{
    EngineConfig, Job, JobError, JobId, JobParams, JobStatus, TranscriptResult,
};

use crate::cancel::CancelFlag;
use crate::hub::StatusHub;
use crate::pipeline;
use crate::registry::JobRegistry;
use crate::transcriber::{Cleanup, Transcriber};

/// How often `await_completion` re-reads job state.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminal/pending partition returned by [`Dispatcher::await_completion`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub completed: Vec<JobId>,
    pub failed: Vec<JobId>,
    pub cancelled: Vec<JobId>,
    pub pending: Vec<JobId>,
}

impl CompletionReport {
    /// Whether every requested job reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Execution handle for an in-flight job. Exists only while the job is
/// queued or running; removed on any terminal transition.
struct WorkerHandle {
    cancel: CancelFlag,
    task: JoinHandle<()>,
}

/// Schedules transcription jobs onto a bounded worker pool.
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    hub: Arc<StatusHub>,
    transcriber: Arc<dyn Transcriber>,
    cleanup: Arc<dyn Cleanup>,
    slots: Arc<Semaphore>,
    workers: Mutex<HashMap<JobId, WorkerHandle>>,
    shutdown: CancellationToken,
    job_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        config: EngineConfig,
        transcriber: Arc<dyn Transcriber>,
        cleanup: Arc<dyn Cleanup>,
    ) -> Arc<Self> {
        tracing::info!(
            workers = config.workers,
            job_timeout_secs = config.job_timeout_secs,
            transcriber = transcriber.name(),
            "Dispatcher started"
        );
        Arc::new(Self {
            registry: Arc::new(JobRegistry::new()),
            hub: Arc::new(StatusHub::new()),
            transcriber,
            cleanup,
            slots: Arc::new(Semaphore::new(config.workers)),
            workers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        })
    }

    /// Job state store. Snapshots only; all mutation stays inside the engine.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Status broadcast hub for subscribing to job updates.
    pub fn hub(&self) -> &Arc<StatusHub> {
        &self.hub
    }

    /// Submit a new transcription job. Returns immediately with the job id;
    /// the job sits queued until a worker slot frees up.
    pub fn submit(self: &Arc<Self>, input: PathBuf, params: JobParams) -> JobId {
        let job = Job::new(input.clone(), params.clone());
        let id = job.id;
        self.registry.insert(job);
        self.hub.reset(&id);
        self.hub.publish(id, JobStatus::Queued, 0, "Queued");
        tracing::info!(job_id = %id, input = %input.display(), "Job submitted");
        self.schedule(id, input, params);
        id
    }

    /// Requeue a terminal job on the same id, optionally with new
    /// parameters. Starts a fresh progress sequence at 0 and clears the
    /// hub's dedup high-water mark so the new sequence is delivered.
    pub fn resubmit(self: &Arc<Self>, id: &JobId, params: Option<JobParams>) -> Result<(), JobError> {
        let job = self.registry.update(id, |job| {
            if !job.status.is_terminal() {
                return Err(JobError::InvalidTransition {
                    from: job.status,
                    to: JobStatus::Queued,
                });
            }
            job.reset_for_resubmit(params);
            Ok(())
        })?;
        self.hub.reset(id);
        self.hub.publish(*id, JobStatus::Queued, 0, "Requeued");
        tracing::info!(job_id = %id, "Job resubmitted");
        self.schedule(*id, job.input, job.params);
        Ok(())
    }

    /// Request cancellation. Returns `true` if this call accepted the
    /// request; `false` for unknown, terminal, or already-cancelled jobs.
    ///
    /// A still-queued job is pulled from the queue and transitioned to
    /// `cancelled` right here — its worker never runs. A running job only
    /// gets the advisory flag; the job body observes it at the next
    /// checkpoint and reports `cancelled` itself.
    pub fn cancel(&self, id: &JobId) -> bool {
        let flag = match self.workers.lock() {
            Ok(workers) => workers.get(id).map(|handle| handle.cancel.clone()),
            Err(e) => {
                tracing::error!("Mutex poisoned reading worker handles: {e}");
                None
            }
        };

        let mut newly_requested = false;
        let mut cancelled_in_queue = false;
        let update = self.registry.update(id, |job| {
            if job.status.is_terminal() || job.cancel_requested {
                return Ok(());
            }
            job.cancel_requested = true;
            newly_requested = true;
            if job.status == JobStatus::Queued {
                job.transition(JobStatus::Cancelled)?;
                cancelled_in_queue = true;
            }
            Ok(())
        });

        let job = match update {
            Ok(job) => job,
            Err(e) => {
                tracing::debug!(job_id = %id, error = %e, "Cancel ignored");
                return false;
            }
        };
        if !newly_requested {
            return false;
        }

        if let Some(flag) = flag {
            flag.request();
        }

        if cancelled_in_queue {
            // Abort the parked worker task; it never acquired a permit.
            if let Ok(mut workers) = self.workers.lock() {
                if let Some(handle) = workers.remove(id) {
                    handle.task.abort();
                }
            }
            self.hub
                .publish(*id, JobStatus::Cancelled, job.progress, "Cancelled before start");
            tracing::info!(job_id = %id, "Queued job cancelled");
        } else {
            tracing::info!(job_id = %id, "Cancellation requested");
        }
        true
    }

    /// Block the caller (never pool workers) until every listed job reaches
    /// a terminal state or the timeout elapses. Unknown ids are reported as
    /// failed — they can never complete.
    pub async fn await_completion(&self, ids: &[JobId], timeout: Duration) -> CompletionReport {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let report = self.partition(ids);
            if report.is_settled() || tokio::time::Instant::now() >= deadline {
                return report;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop accepting queued work and ask in-flight jobs to cancel.
    pub fn shutdown(&self) {
        tracing::info!("Dispatcher shutting down");
        self.shutdown.cancel();
        self.slots.close();
        if let Ok(workers) = self.workers.lock() {
            for handle in workers.values() {
                handle.cancel.request();
            }
        }
    }

    fn schedule(self: &Arc<Self>, id: JobId, input: PathBuf, params: JobParams) {
        let cancel = CancelFlag::new();
        // Insert under the lock that the worker's own removal also takes, so
        // the handle is registered before the task can possibly finish.
        let mut workers = match self.workers.lock() {
            Ok(workers) => workers,
            Err(e) => {
                tracing::error!(job_id = %id, "Mutex poisoned scheduling job: {e}");
                return;
            }
        };
        let task = tokio::spawn(Self::run_worker(
            Arc::clone(self),
            id,
            input,
            params,
            cancel.clone(),
        ));
        workers.insert(id, WorkerHandle { cancel, task });
    }

    async fn run_worker(
        this: Arc<Self>,
        id: JobId,
        input: PathBuf,
        params: JobParams,
        cancel: CancelFlag,
    ) {
        let permit = tokio::select! {
            _ = this.shutdown.cancelled() => {
                this.forget_worker(&id);
                return;
            }
            permit = Arc::clone(&this.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    this.forget_worker(&id);
                    return;
                }
            },
        };

        // Cancelled while queued: `cancel` already recorded the terminal
        // state. The job must never execute.
        if cancel.is_cancelled() {
            drop(permit);
            this.forget_worker(&id);
            return;
        }

        let job = match this
            .registry
            .update(&id, |job| job.transition(JobStatus::Running))
        {
            Ok(job) => job,
            Err(e) => {
                // Removed or already terminal — lost a race with cancel.
                tracing::debug!(job_id = %id, error = %e, "Skipping execution");
                drop(permit);
                this.forget_worker(&id);
                return;
            }
        };
        this.hub
            .publish(id, JobStatus::Running, job.progress, "Transcription started");
        tracing::info!(job_id = %id, "Job started");

        let body = pipeline::run_job(
            Arc::clone(&this.registry),
            Arc::clone(&this.hub),
            Arc::clone(&this.transcriber),
            id,
            input,
            params,
            cancel.clone(),
        );
        let outcome = match tokio::time::timeout(this.job_timeout, body).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Ask the (detached) job body to unwind; the terminal status
                // below wins regardless of when it notices.
                cancel.request();
                Err(JobError::Timeout(this.job_timeout.as_secs()))
            }
        };

        this.finish(id, outcome);
        if let Err(e) = this.cleanup.cleanup(&id) {
            tracing::warn!(job_id = %id, error = %e, "Job cleanup failed");
        }
        this.forget_worker(&id);
        drop(permit);
    }

    /// Convert the job body's outcome into exactly one terminal registry
    /// update. A job that is already terminal (force-failed on timeout,
    /// cancelled in a race) keeps its recorded outcome; the late update is
    /// discarded.
    fn finish(&self, id: JobId, outcome: Result<TranscriptResult, JobError>) {
        let update = match outcome {
            Ok(result) => self
                .registry
                .update(&id, |job| {
                    job.transition(JobStatus::Completed)?;
                    job.progress = 100;
                    job.result = Some(result);
                    Ok(())
                })
                .map(|job| (job, "Transcription complete".to_string())),
            Err(JobError::Cancelled) => self
                .registry
                .update(&id, |job| job.transition(JobStatus::Cancelled))
                .map(|job| (job, "Transcription cancelled".to_string())),
            Err(err) => {
                tracing::error!(job_id = %id, error = %err, "Job failed");
                let message = err.to_string();
                self.registry
                    .update(&id, |job| {
                        job.transition(JobStatus::Failed)?;
                        job.error_message = Some(message.clone());
                        Ok(())
                    })
                    .map(|job| (job, message))
            }
        };

        match update {
            Ok((job, message)) => {
                self.hub.publish(id, job.status, job.progress, message);
                tracing::info!(job_id = %id, status = %job.status, "Job finished");
            }
            Err(e) => {
                tracing::debug!(job_id = %id, error = %e, "Terminal update discarded");
            }
        }
    }

    fn partition(&self, ids: &[JobId]) -> CompletionReport {
        let mut report = CompletionReport::default();
        for id in ids {
            match self.registry.get(id) {
                Some(job) => match job.status {
                    JobStatus::Completed => report.completed.push(*id),
                    JobStatus::Failed => report.failed.push(*id),
                    JobStatus::Cancelled => report.cancelled.push(*id),
                    JobStatus::Queued | JobStatus::Running => report.pending.push(*id),
                },
                None => report.failed.push(*id),
            }
        }
        report
    }

    fn forget_worker(&self, id: &JobId) {
        if let Ok(mut workers) = self.workers.lock() {
            workers.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::NamedTempFile;
    use voxscribe_core::TranscriptSegment;

    /// Transcriber double: sleeps for `delay` while polling the cancel flag,
    /// then succeeds or fails depending on the `fail` switch. Tracks call
    /// and concurrency counts for capacity assertions.
    struct StubTranscriber {
        delay: Duration,
        fail: AtomicBool,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl StubTranscriber {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    impl Transcriber for StubTranscriber {
        fn transcribe(
            &self,
            _input: &std::path::Path,
            _params: &JobParams,
            cancel: &CancelFlag,
        ) -> Result<TranscriptResult, JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            let run = || {
                let deadline = std::time::Instant::now() + self.delay;
                while std::time::Instant::now() < deadline {
                    if cancel.is_cancelled() {
                        return Err(JobError::Cancelled);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                if self.fail.load(Ordering::SeqCst) {
                    Err(JobError::Processing("stub failure".into()))
                } else {
                    Ok(TranscriptResult {
                        segments: vec![TranscriptSegment {
                            speaker: "Speaker 1".into(),
                            text: "hello".into(),
                            start_secs: 0.0,
                            end_secs: 1.0,
                        }],
                    })
                }
            };
            let result = run();
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn setup(workers: usize, delay: Duration) -> (Arc<Dispatcher>, Arc<StubTranscriber>, NamedTempFile) {
        let stub = StubTranscriber::new(delay);
        let dispatcher = Dispatcher::new(
            EngineConfig::default().with_workers(workers),
            Arc::clone(&stub) as Arc<dyn Transcriber>,
            Arc::new(crate::transcriber::NoopCleanup),
        );
        let audio = NamedTempFile::new().expect("temp audio file");
        (dispatcher, stub, audio)
    }

    async fn wait_until_running(dispatcher: &Dispatcher, id: &JobId) {
        for _ in 0..200 {
            if dispatcher.registry().get(id).map(|j| j.status) == Some(JobStatus::Running) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never started running");
    }

    #[tokio::test]
    async fn test_submit_runs_to_completion() {
        let (dispatcher, _stub, audio) = setup(2, Duration::from_millis(50));
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());

        let report = dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(report.completed, vec![id]);

        let job = dispatcher.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());
        assert!(job.result.is_some());
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_missing_input_fails_the_job() {
        let (dispatcher, stub, _audio) = setup(1, Duration::from_millis(10));
        let id = dispatcher.submit(PathBuf::from("/nonexistent/audio.wav"), JobParams::default());

        let report = dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(report.failed, vec![id]);

        let job = dispatcher.registry().get(&id).unwrap();
        assert!(job.error_message.as_deref().unwrap().contains("unavailable"));
        assert_eq!(stub.calls(), 0, "transcriber must not run without input");
    }

    #[tokio::test]
    async fn test_processing_failure_is_terminal_failed() {
        let (dispatcher, stub, audio) = setup(1, Duration::from_millis(20));
        stub.fail.store(true, Ordering::SeqCst);
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());

        let report = dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(report.failed, vec![id]);

        let job = dispatcher.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("stub failure"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_pool_capacity_is_respected() {
        let (dispatcher, stub, audio) = setup(2, Duration::from_millis(300));
        let ids: Vec<JobId> = (0..3)
            .map(|_| dispatcher.submit(audio.path().to_path_buf(), JobParams::default()))
            .collect();

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Two slots busy, the third job still queued.
        assert!(dispatcher.registry().running_count() <= 2);
        assert_eq!(
            dispatcher.registry().get(&ids[2]).unwrap().status,
            JobStatus::Queued
        );

        let report = dispatcher
            .await_completion(&ids, Duration::from_secs(15))
            .await;
        assert_eq!(report.completed.len(), 3);
        assert!(stub.max_active() <= 2, "peak concurrency {}", stub.max_active());
    }

    #[tokio::test]
    async fn test_oversubscribed_pool_never_exceeds_capacity() {
        let (dispatcher, stub, audio) = setup(2, Duration::from_millis(100));
        let ids: Vec<JobId> = (0..6)
            .map(|_| dispatcher.submit(audio.path().to_path_buf(), JobParams::default()))
            .collect();

        let report = dispatcher
            .await_completion(&ids, Duration::from_secs(20))
            .await;
        assert!(report.is_settled());
        assert_eq!(report.completed.len(), 6);
        assert!(stub.max_active() <= 2, "peak concurrency {}", stub.max_active());
        assert_eq!(stub.calls(), 6);
    }

    #[tokio::test]
    async fn test_cancel_queued_job_never_executes() {
        let (dispatcher, stub, audio) = setup(1, Duration::from_millis(300));
        let running = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        let queued = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());

        wait_until_running(&dispatcher, &running).await;
        assert!(dispatcher.cancel(&queued));

        // Terminal immediately, before any worker slot freed up.
        let job = dispatcher.registry().get(&queued).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.started_at.is_none());

        let report = dispatcher
            .await_completion(&[running, queued], Duration::from_secs(10))
            .await;
        assert_eq!(report.completed, vec![running]);
        assert_eq!(report.cancelled, vec![queued]);
        assert_eq!(stub.calls(), 1, "cancelled queued job must never reach the transcriber");
    }

    #[tokio::test]
    async fn test_cancel_running_job_ends_cancelled_not_failed() {
        let (dispatcher, _stub, audio) = setup(1, Duration::from_secs(5));
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());

        wait_until_running(&dispatcher, &id).await;
        assert!(dispatcher.cancel(&id));

        let report = dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(report.cancelled, vec![id]);

        let job = dispatcher.registry().get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.error_message.is_none());
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_double_cancel_second_returns_false() {
        let (dispatcher, _stub, audio) = setup(1, Duration::from_secs(5));
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        wait_until_running(&dispatcher, &id).await;

        let mut terminal_events = 0;
        let mut rx = dispatcher.hub().subscribe();

        assert!(dispatcher.cancel(&id));
        assert!(!dispatcher.cancel(&id), "second cancel must be rejected");

        dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert!(!dispatcher.cancel(&id), "cancel on terminal job is a no-op");

        while let Ok(update) = rx.try_recv() {
            if update.job_id == id && update.status.is_terminal() {
                terminal_events += 1;
            }
        }
        assert_eq!(terminal_events, 1, "exactly one terminal transition");
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_returns_false() {
        let (dispatcher, _stub, _audio) = setup(1, Duration::from_millis(10));
        assert!(!dispatcher.cancel(&uuid::Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_timeout_forces_failure_that_sticks() {
        let stub = StubTranscriber::new(Duration::from_secs(30));
        let dispatcher = Dispatcher::new(
            EngineConfig::default().with_workers(1).with_job_timeout_secs(1),
            Arc::clone(&stub) as Arc<dyn Transcriber>,
            Arc::new(crate::transcriber::NoopCleanup),
        );
        let audio = NamedTempFile::new().unwrap();
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());

        let report = dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(report.failed, vec![id]);

        let job = dispatcher.registry().get(&id).unwrap();
        assert!(job.error_message.as_deref().unwrap().contains("timed out"));

        // The detached job body observes the cancel flag later; its outcome
        // must not overwrite the recorded failure.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(dispatcher.registry().get(&id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_await_completion_reports_pending_on_timeout() {
        let (dispatcher, _stub, audio) = setup(1, Duration::from_secs(10));
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        let ghost = uuid::Uuid::new_v4();

        let report = dispatcher
            .await_completion(&[id, ghost], Duration::from_millis(200))
            .await;
        assert_eq!(report.pending, vec![id]);
        assert_eq!(report.failed, vec![ghost], "unknown ids can never complete");
        assert!(!report.is_settled());

        dispatcher.cancel(&id);
    }

    #[tokio::test]
    async fn test_resubmit_restarts_progress_sequence() {
        let (dispatcher, stub, audio) = setup(1, Duration::from_millis(30));
        stub.fail.store(true, Ordering::SeqCst);
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(dispatcher.registry().get(&id).unwrap().status, JobStatus::Failed);

        stub.fail.store(false, Ordering::SeqCst);
        let mut rx = dispatcher.hub().subscribe();
        dispatcher.resubmit(&id, None).expect("resubmit terminal job");

        let report = dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
        assert_eq!(report.completed, vec![id]);

        let job = dispatcher.registry().get(&id).unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.error_message.is_none());
        assert!(job.result.is_some());

        // The dedup reset lets the fresh low progress values through again.
        let mut saw_requeue = false;
        let mut last_progress = 0u8;
        let mut monotonic_after_reset = true;
        while let Ok(update) = rx.try_recv() {
            if update.job_id != id {
                continue;
            }
            if update.status == JobStatus::Queued && update.progress == 0 {
                saw_requeue = true;
                last_progress = 0;
                continue;
            }
            if update.progress < last_progress {
                monotonic_after_reset = false;
            }
            last_progress = update.progress;
        }
        assert!(saw_requeue, "subscribers must see the new sequence start at 0");
        assert!(monotonic_after_reset);
    }

    #[tokio::test]
    async fn test_resubmit_active_job_is_rejected() {
        let (dispatcher, _stub, audio) = setup(1, Duration::from_secs(5));
        let id = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        wait_until_running(&dispatcher, &id).await;

        let err = dispatcher.resubmit(&id, None).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));

        dispatcher.cancel(&id);
        dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;
    }

    #[tokio::test]
    async fn test_subscriber_sees_non_decreasing_progress() {
        let (dispatcher, _stub, audio) = setup(1, Duration::from_millis(100));
        let mut rx = dispatcher.hub().subscribe();
        let id = dispatcher.submit(
            audio.path().to_path_buf(),
            JobParams {
                duration_hint_secs: Some(1.0),
                ..JobParams::default()
            },
        );

        dispatcher
            .await_completion(&[id], Duration::from_secs(10))
            .await;

        let mut last = 0u8;
        let mut events = 0usize;
        while let Ok(update) = rx.try_recv() {
            if update.job_id != id {
                continue;
            }
            events += 1;
            assert!(
                update.progress >= last,
                "progress regressed from {last} to {}",
                update.progress
            );
            last = update.progress;
        }
        assert!(events > 2, "expected a stream of progress events");
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_shutdown_drops_queued_jobs() {
        let (dispatcher, stub, audio) = setup(1, Duration::from_millis(500));
        let running = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        let queued = dispatcher.submit(audio.path().to_path_buf(), JobParams::default());
        wait_until_running(&dispatcher, &running).await;

        dispatcher.shutdown();

        let report = dispatcher
            .await_completion(&[running], Duration::from_secs(10))
            .await;
        // The in-flight worker was asked to cancel cooperatively.
        assert_eq!(report.cancelled, vec![running]);
        // The queued job never ran.
        assert_eq!(stub.calls(), 1);
        assert_eq!(
            dispatcher.registry().get(&queued).unwrap().status,
            JobStatus::Queued
        );
    }
}
