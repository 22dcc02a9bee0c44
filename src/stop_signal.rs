use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Held by whoever owns a background task. Dropping it tells the task to exit at its next tick.
pub(crate) struct Stopper {
    stop_signal: Arc<AtomicBool>,
}

pub(crate) struct StopCheck {
    stop_signal: Arc<AtomicBool>,
}

impl Drop for Stopper {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
    }
}

impl StopCheck {
    pub(crate) fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::Acquire)
    }
}

pub(crate) fn new() -> (Stopper, StopCheck) {
    let stop_signal = Arc::new(AtomicBool::new(false));

    let stopper = Stopper {
        stop_signal: stop_signal.clone(),
    };
    let stop_check = StopCheck { stop_signal };

    (stopper, stop_check)
}
