// crates/engine/src/cancel.rs
//! Cooperative cancellation flag shared between caller threads and workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation signal for a single job execution.
///
/// This is the only piece of state written by caller threads and read by the
/// worker body, so it is an atomic boolean with acquire/release ordering
/// rather than a plain shared field. Clones share the underlying flag; once
/// raised it never resets.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` if this call flipped it, `false` if it
    /// was already raised.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// Checkpoint read for the worker body.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
