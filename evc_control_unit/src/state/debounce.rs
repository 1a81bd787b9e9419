//! Detection debounce.
//!
//! A vehicle counts as confirmed once car and EV plate have been observed
//! together on every poll for at least the debounce duration. A single
//! negative observation empties the timer; the next positive one starts it
//! again from that moment.

use std::time::Duration;

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceStatus {
    /// Observation was negative; timer is empty.
    Cleared,
    /// First positive observation; timer started now.
    Started,
    /// Positive, but not for long enough yet.
    Accumulating,
    /// Positive continuously for at least the debounce duration.
    Elapsed,
}

/// Optional start timestamp plus the required hold time.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    duration: Duration,
    started_at: Option<Duration>,
}

impl DebounceTimer {
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
        }
    }

    /// Feed one poll result taken at monotonic time `now`.
    pub fn observe(&mut self, confirmed: bool, now: Duration) -> DebounceStatus {
        if !confirmed {
            self.started_at = None;
            return DebounceStatus::Cleared;
        }
        match self.started_at {
            None => {
                self.started_at = Some(now);
                DebounceStatus::Started
            }
            Some(start) if now.saturating_sub(start) >= self.duration => DebounceStatus::Elapsed,
            Some(_) => DebounceStatus::Accumulating,
        }
    }

    /// Empty the timer (end of session).
    pub fn clear(&mut self) {
        self.started_at = None;
    }

    #[inline]
    pub const fn started_at(&self) -> Option<Duration> {
        self.started_at
    }

    #[inline]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}
