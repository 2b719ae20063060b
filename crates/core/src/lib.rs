// crates/core/src/lib.rs
//! Domain types for the voxscribe transcription service.
//!
//! This crate holds the job record, transcript model, error taxonomy, and
//! engine configuration. It is IO-free and async-free so that both the
//! orchestration engine and the HTTP layer can depend on it without pulling
//! in a runtime.

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::JobError;
pub use types::{
    Job, JobId, JobParams, JobStatus, StatusUpdate, TranscriptResult, TranscriptSegment,
};
