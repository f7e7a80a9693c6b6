//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, externally settable stop signal.
///
/// The caller sets the flag to request a stop and clears it to permit a
/// fresh run; the engine only ever reads it. All four check granularities
/// (table loop, batch, row, column) go through [`CancelFlag::is_cancelled`]
/// so a stop takes effect within one row's work, not one table's.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the signal so a subsequent run starts clean.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// The single reusable cancellation guard.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
