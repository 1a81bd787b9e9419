//! Controller lifecycle transitions.
//!
//! Idle → Confirming → Parking → Charging → Leaving → Idle. Confirming falls
//! back to Idle when detection drops before the debounce elapses. Parking,
//! Charging and Leaving ignore detection flags entirely.

use std::fmt;

use crate::predictor::StepPlan;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    /// Waiting for car and EV plate in the same frame.
    #[default]
    Idle,
    /// Detection held; debounce timer running.
    Confirming,
    /// Measuring and moving the coils into position.
    Parking,
    /// Relay closed; polling telemetry and distances.
    Charging,
    /// Vehicle gone; retracting the coils.
    Leaving,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlState::Idle => "Idle",
            ControlState::Confirming => "Confirming",
            ControlState::Parking => "Parking",
            ControlState::Charging => "Charging",
            ControlState::Leaving => "Leaving",
        })
    }
}

/// Event driving a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Snapshot shows car and EV plate.
    VehicleSeen,
    /// Either flag false while confirming.
    VehicleLost,
    /// Detection held for the debounce duration.
    DebounceElapsed,
    /// Coils in position and relay closed.
    Aligned,
    /// Both distances beyond the departure threshold in one poll.
    VehicleDeparted,
    /// Coils retracted, shared state reset.
    Retracted,
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded: new state.
    Ok(ControlState),
    /// Transition rejected: reason.
    Rejected(&'static str),
}

/// Holds the current lifecycle state.
#[derive(Debug, Clone, Default)]
pub struct ControlStateMachine {
    state: ControlState,
}

impl ControlStateMachine {
    pub const fn new() -> Self {
        Self {
            state: ControlState::Idle,
        }
    }

    #[inline]
    pub const fn state(&self) -> ControlState {
        self.state
    }

    /// Attempt a transition given an event.
    pub fn handle_event(&mut self, event: ControlEvent) -> TransitionResult {
        use ControlEvent::*;
        use ControlState::*;

        let next = match (self.state, event) {
            (Idle, VehicleSeen) => Confirming,
            (Confirming, VehicleLost) => Idle,
            (Confirming, DebounceElapsed) => Parking,
            (Parking, Aligned) => Charging,
            (Charging, VehicleDeparted) => Leaving,
            (Leaving, Retracted) => Idle,
            (state, _) => return TransitionResult::Rejected(invalid_transition_reason(state)),
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

fn invalid_transition_reason(state: ControlState) -> &'static str {
    match state {
        ControlState::Idle => "Idle: only VehicleSeen allowed",
        ControlState::Confirming => "Confirming: only VehicleLost or DebounceElapsed allowed",
        ControlState::Parking => "Parking: only Aligned allowed",
        ControlState::Charging => "Charging: only VehicleDeparted allowed",
        ControlState::Leaving => "Leaving: only Retracted allowed",
    }
}

/// One detect → park → charge → leave cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: u64,
    /// Set once at Parking; replayed in reverse at Leaving.
    pub plan: Option<StepPlan>,
}

impl Session {
    pub const fn new(id: u64) -> Self {
        Self { id, plan: None }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
