// crates/engine/src/registry.rs
//! Thread-safe store of job records.
//!
//! The registry is the single source of truth for job state. All mutation
//! goes through [`JobRegistry::update`], an atomic read-modify-write: the
//! mutator observes a complete prior state and either commits in full or
//! leaves the record untouched. Reads hand out snapshot clones, so `list`
//! never exposes a job mid-mutation.

use std::collections::HashMap;
use std::sync::RwLock;

use voxscribe_core::{Job, JobError, JobId, JobStatus};

/// In-memory job store keyed by id.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Store a new job record. Returns its id.
    pub fn insert(&self, job: Job) -> JobId {
        let id = job.id;
        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.insert(id, job);
            }
            Err(e) => tracing::error!("RwLock poisoned inserting job: {e}"),
        }
        id
    }

    /// Snapshot of a single job.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading job: {e}");
                None
            }
        }
    }

    /// Atomic read-modify-write of one job record.
    ///
    /// The mutator runs on a draft copy; if it returns an error nothing is
    /// committed. Returns the updated snapshot on success, `NotFound` for an
    /// unknown id (advisory — the job may have been removed concurrently).
    pub fn update<F>(&self, id: &JobId, mutate: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        let mut jobs = match self.jobs.write() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("RwLock poisoned updating job: {e}");
                return Err(JobError::NotFound(*id));
            }
        };
        let job = jobs.get_mut(id).ok_or(JobError::NotFound(*id))?;
        let mut draft = job.clone();
        mutate(&mut draft)?;
        *job = draft.clone();
        Ok(draft)
    }

    /// Snapshot of all jobs, optionally filtered by status.
    pub fn list(&self, filter: Option<JobStatus>) -> Vec<Job> {
        match self.jobs.read() {
            Ok(jobs) => jobs
                .values()
                .filter(|job| filter.map_or(true, |status| job.status == status))
                .cloned()
                .collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned listing jobs: {e}");
                Vec::new()
            }
        }
    }

    /// Remove a job record. Returns whether it existed.
    pub fn remove(&self, id: &JobId) -> bool {
        match self.jobs.write() {
            Ok(mut jobs) => jobs.remove(id).is_some(),
            Err(e) => {
                tracing::error!("RwLock poisoned removing job: {e}");
                false
            }
        }
    }

    /// Number of jobs currently in the running state.
    pub fn running_count(&self) -> usize {
        match self.jobs.read() {
            Ok(jobs) => jobs
                .values()
                .filter(|job| job.status == JobStatus::Running)
                .count(),
            Err(e) => {
                tracing::error!("RwLock poisoned counting jobs: {e}");
                0
            }
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
