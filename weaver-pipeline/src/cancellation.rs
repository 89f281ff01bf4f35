use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag shared with the outside world for stopping a weaving run. The scheduler checks it only
/// between two steps, so a step is either fully executed or not executed at all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Make a new token, not cancelled.
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Ask the run to stop at the next step boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the run has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
