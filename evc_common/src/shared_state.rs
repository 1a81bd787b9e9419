//! Detection state shared between the vision worker and the controller.
//!
//! The key set is fixed: `car_detected`, `ev_detected`, `normal_detected`
//! and `last_detected_time`. The vision worker owns the writes through
//! [`SharedState::publish_frame`]; the controller only reads and, at the end
//! of a session, calls [`SharedState::reset`].
//!
//! Whole-record reads and writes happen under one lock, so
//! [`SharedState::snapshot`] never returns a mix of two frames. Per-key
//! getters remain for callers that only need one cell.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Names of the shared cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    CarDetected,
    EvDetected,
    NormalDetected,
    LastDetectedTime,
}

impl StateKey {
    pub const ALL: [StateKey; 4] = [
        StateKey::CarDetected,
        StateKey::EvDetected,
        StateKey::NormalDetected,
        StateKey::LastDetectedTime,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CarDetected => "car_detected",
            Self::EvDetected => "ev_detected",
            Self::NormalDetected => "normal_detected",
            Self::LastDetectedTime => "last_detected_time",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One consistent view of the detection cells.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionSnapshot {
    pub car_detected: bool,
    pub ev_detected: bool,
    pub normal_detected: bool,
    /// Epoch seconds of the last frame showing car and EV plate; 0 if none.
    pub last_detected_time: f64,
}

impl DetectionSnapshot {
    /// Car and EV plate seen in the same frame.
    #[inline]
    pub const fn vehicle_confirmed(&self) -> bool {
        self.car_detected && self.ev_detected
    }
}

/// Process-wide detection state.
#[derive(Debug, Default)]
pub struct SharedState {
    cells: RwLock<DetectionSnapshot>,
    frames: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the classes found in one vision frame.
    ///
    /// `last_detected_time` moves to `now_epoch_s` only when both the car and
    /// the EV plate are present; otherwise it keeps its previous value.
    pub fn publish_frame(
        &self,
        car_detected: bool,
        ev_detected: bool,
        normal_detected: bool,
        now_epoch_s: f64,
    ) -> DetectionSnapshot {
        let mut cells = self.cells.write();
        cells.car_detected = car_detected;
        cells.ev_detected = ev_detected;
        cells.normal_detected = normal_detected;
        if car_detected && ev_detected {
            cells.last_detected_time = now_epoch_s;
        }
        self.frames.fetch_add(1, Ordering::Relaxed);
        *cells
    }

    /// Consistent copy of all cells.
    pub fn snapshot(&self) -> DetectionSnapshot {
        *self.cells.read()
    }

    /// Return every cell to its initial value (end of session).
    pub fn reset(&self) {
        *self.cells.write() = DetectionSnapshot::default();
    }

    pub fn car_detected(&self) -> bool {
        self.cells.read().car_detected
    }

    pub fn ev_detected(&self) -> bool {
        self.cells.read().ev_detected
    }

    pub fn normal_detected(&self) -> bool {
        self.cells.read().normal_detected
    }

    pub fn last_detected_time(&self) -> f64 {
        self.cells.read().last_detected_time
    }

    /// Number of frames published since startup.
    pub fn frames_published(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}
