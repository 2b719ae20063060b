// crates/engine/src/estimator.rs
//! Phase-based progress smoothing for a single job execution.
//!
//! Transcription is dominated by one opaque long call (the ASR collaborator),
//! which reports nothing while it runs. The estimator keeps observers fed:
//! each phase declares a progress range and an estimated duration, a
//! background ticker walks the displayed value toward `end - 1`, and
//! [`ProgressEstimator::complete_phase`] fast-forwards to the exact phase
//! endpoint once the real work is done. Displayed progress only ever moves
//! up, and every increase produces exactly one hub event.
//!
//! One estimator is created per job execution and owned by it exclusively.
//! Sharing an instance across jobs would corrupt both jobs' progress.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use voxscribe_core::JobId;

use crate::hub::StatusHub;
use crate::registry::JobRegistry;

/// Bounds for the ticker interval. The interval is chosen so the number of
/// ticks roughly matches the phase's progress range.
const MIN_TICK: Duration = Duration::from_millis(50);
const MAX_TICK: Duration = Duration::from_millis(500);

/// Delay per percentage point while fast-forwarding to a phase endpoint.
const FAST_FORWARD_STEP: Duration = Duration::from_millis(2);

struct ActivePhase {
    message: String,
    end_pct: u8,
    ticker: JoinHandle<()>,
}

/// Drives the displayed progress of one job.
pub struct ProgressEstimator {
    job_id: JobId,
    registry: Arc<JobRegistry>,
    hub: Arc<StatusHub>,
    phase: Mutex<Option<ActivePhase>>,
}

impl ProgressEstimator {
    pub fn new(job_id: JobId, registry: Arc<JobRegistry>, hub: Arc<StatusHub>) -> Self {
        Self {
            job_id,
            registry,
            hub,
            phase: Mutex::new(None),
        }
    }

    /// Begin background advancement from `max(current, start_pct)` toward
    /// `end_pct - 1` over `estimated`. Replaces any phase still running.
    pub fn start_phase(
        &self,
        name: &str,
        message: &str,
        start_pct: u8,
        end_pct: u8,
        estimated: Duration,
    ) {
        self.halt_ticker();

        tracing::debug!(
            job_id = %self.job_id,
            phase = name,
            start_pct,
            end_pct,
            estimated_secs = estimated.as_secs_f64(),
            "Phase started"
        );

        advance_to(&self.registry, &self.hub, &self.job_id, start_pct, message);

        let range = end_pct.saturating_sub(start_pct).max(1);
        let interval = (estimated / u32::from(range)).clamp(MIN_TICK, MAX_TICK);
        let ceiling = end_pct.saturating_sub(1);

        let registry = Arc::clone(&self.registry);
        let hub = Arc::clone(&self.hub);
        let job_id = self.job_id;
        let tick_message = message.to_string();
        let ticker = tokio::spawn(async move {
            let started = Instant::now();
            loop {
                tokio::time::sleep(interval).await;
                let ratio = if estimated.is_zero() {
                    1.0
                } else {
                    (started.elapsed().as_secs_f64() / estimated.as_secs_f64()).min(0.99)
                };
                let target =
                    (start_pct + (f64::from(range) * ratio) as u8).min(ceiling);
                advance_to(&registry, &hub, &job_id, target, &tick_message);
                if target >= ceiling {
                    break;
                }
            }
        });

        match self.phase.lock() {
            Ok(mut guard) => {
                *guard = Some(ActivePhase {
                    message: message.to_string(),
                    end_pct,
                    ticker,
                });
            }
            Err(e) => {
                tracing::error!("Mutex poisoned starting phase: {e}");
                ticker.abort();
            }
        }
    }

    /// Stop the ticker and synchronously catch the displayed progress up to
    /// the phase endpoint, one point at a time. After this call the job's
    /// displayed progress equals the phase's `end_pct`, even if the phase
    /// finished with zero elapsed time.
    pub async fn complete_phase(&self) {
        let Some(phase) = self.take_phase() else {
            return;
        };
        phase.ticker.abort();

        let current = self
            .registry
            .get(&self.job_id)
            .map(|job| job.progress)
            .unwrap_or(phase.end_pct);
        for pct in current.saturating_add(1)..=phase.end_pct {
            advance_to(&self.registry, &self.hub, &self.job_id, pct, &phase.message);
            tokio::time::sleep(FAST_FORWARD_STEP).await;
        }
    }

    /// Halt background advancement without fast-forwarding. Used on failure
    /// and cancellation paths where no further progress illusion is
    /// warranted.
    pub fn stop(&self) {
        self.halt_ticker();
    }

    fn halt_ticker(&self) {
        if let Some(phase) = self.take_phase() {
            phase.ticker.abort();
        }
    }

    fn take_phase(&self) -> Option<ActivePhase> {
        match self.phase.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                tracing::error!("Mutex poisoned taking phase: {e}");
                None
            }
        }
    }
}

impl Drop for ProgressEstimator {
    fn drop(&mut self) {
        self.halt_ticker();
    }
}

/// Raise the job's displayed progress to `pct` if that is an increase, and
/// publish exactly one hub event for it. Regressions and no-ops are
/// suppressed here, before the hub even sees them.
fn advance_to(registry: &JobRegistry, hub: &StatusHub, job_id: &JobId, pct: u8, message: &str) {
    let mut advanced = false;
    match registry.update(job_id, |job| {
        if pct > job.progress {
            job.progress = pct;
            advanced = true;
        }
        Ok(())
    }) {
        Ok(job) => {
            if advanced {
                hub.publish(*job_id, job.status, pct, message);
            }
        }
        Err(_) => {
            // Job removed mid-flight; nothing left to display.
        }
    }
}
