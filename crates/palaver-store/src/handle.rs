use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancel handle for a live subscription or observer.
///
/// `cancel` only sets a flag, so calling it twice is safe; every teardown
/// path may check `is_cancelled` first without racing another canceller.
#[derive(Debug, Clone)]
pub struct LiveHandle {
    cancelled: Arc<AtomicBool>,
}

impl LiveHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for LiveHandle {
    fn default() -> Self {
        Self::new()
    }
}
