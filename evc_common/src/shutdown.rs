//! Cooperative shutdown flag shared by the interrupt handler and workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::time::Clock;

/// Longest uninterrupted slice of a [`ShutdownToken::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Set once on SIGINT/SIGTERM (or when a worker fails); never cleared.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    tripped: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if shutdown is requested.
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, clock: &dyn Clock, duration: Duration) -> bool {
        let deadline = clock.now() + duration;
        loop {
            if self.is_tripped() {
                return false;
            }
            let now = clock.now();
            if now >= deadline {
                return true;
            }
            clock.sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
