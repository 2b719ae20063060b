// crates/engine/src/lib.rs
//! Job orchestration engine for voxscribe.
//!
//! Transport-free core that schedules transcription jobs on a bounded worker
//! pool, tracks their state in a thread-safe registry, smooths per-phase
//! progress, and fans status out to subscribers with deduplication. The
//! actual speech recognition is behind the [`Transcriber`] trait so the HTTP
//! layer (or tests) can plug in any implementation.

pub mod cancel;
pub mod dispatcher;
pub mod estimator;
pub mod hub;
mod pipeline;
pub mod registry;
pub mod transcriber;

pub use cancel::CancelFlag;
pub use dispatcher::{CompletionReport, Dispatcher};
pub use estimator::ProgressEstimator;
pub use hub::{JobUpdates, StatusHub};
pub use registry::JobRegistry;
pub use transcriber::{Cleanup, NoopCleanup, Transcriber};
