//! Caller-owned cancellation/progress token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Cancellation and progress token consumed by a blocking client call.
///
/// Written from any thread (a UI cancel button, a test harness), read by the
/// client's cancel watcher once per poll interval. Writers never block.
pub trait ProgressMonitor: Send + Sync {
    fn is_canceled(&self) -> bool;

    /// Report progress in percent. Values above 100 are clamped.
    fn set_progress(&self, _percentage: u8) {}

    fn progress(&self) -> u8 {
        0
    }
}

/// Atomic-backed monitor. Clones share state, so hand one clone to the
/// thread that cancels and borrow another for the call.
#[derive(Debug, Clone, Default)]
pub struct DefaultProgressMonitor {
    canceled: Arc<AtomicBool>,
    progress: Arc<AtomicU8>,
}

impl DefaultProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_canceled(&self, canceled: bool) {
        self.canceled.store(canceled, Ordering::Release);
    }
}

impl ProgressMonitor for DefaultProgressMonitor {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    fn set_progress(&self, percentage: u8) {
        self.progress.store(percentage.min(100), Ordering::Release);
    }

    fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }
}
