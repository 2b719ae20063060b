// crates/core/src/config.rs
//! Engine configuration.

/// Tunables for the worker pool dispatcher.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker slots executing jobs concurrently.
    pub workers: usize,
    /// Advisory wall-clock limit for a single job. On expiry the job is
    /// force-failed and its worker is asked to cancel.
    pub job_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            job_timeout_secs: 3600,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// - `VOXSCRIBE_WORKERS` — worker pool capacity (min 1)
    /// - `VOXSCRIBE_JOB_TIMEOUT_SECS` — per-job wall-clock limit
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: std::env::var("VOXSCRIBE_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(|w: usize| w.max(1))
                .unwrap_or(defaults.workers),
            job_timeout_secs: std::env::var("VOXSCRIBE_JOB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.job_timeout_secs),
        }
    }

    /// Override the worker count (used heavily by tests).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Override the job timeout.
    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }
}
