//! Cooperative cancellation shared between the input surface and the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable stop flag. The engine checks it once per received chunk and
/// before each fallback attempt; it never interrupts work already in progress.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current call stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Re-arm the flag before a new call.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
