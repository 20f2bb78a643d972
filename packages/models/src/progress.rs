//! Rendering-agnostic progress reporting.
//!
//! Upload batches and invalidation waits report through [`ProgressCallback`]
//! so the sync core never depends on a terminal library. The CLI supplies an
//! `indicatif` implementation; tests and quiet runs use [`NullProgress`].

use std::sync::Arc;

/// Receiver for progress updates from a long-running operation.
///
/// Implementations must be `Send + Sync` so they can be shared behind an
/// [`Arc`] across tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of units (bytes for uploads).
    fn set_total(&self, total: u64);

    /// Sets the absolute position. Callers only ever move this forward.
    fn set_position(&self, pos: u64);

    /// Replaces the label shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Advances an indeterminate indicator by one frame.
    fn tick(&self);

    /// Marks the operation finished, leaving `msg` on screen.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn set_message(&self, _msg: String) {}
    fn tick(&self) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
