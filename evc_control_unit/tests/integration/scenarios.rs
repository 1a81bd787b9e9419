//! Integration test: full sessions on the simulated bay.
//!
//! Validates: debounce → Parking entry, coil positioning per the predicted
//! plan, departure detection, retraction with the stored plan and the reset
//! of shared state at the end of a session.

use std::time::Duration;

use evc_common::hal::types::Level;
use evc_common::shared_state::DetectionSnapshot;
use evc_common::time::Clock;
use evc_control_unit::state::machine::ControlState;

use super::support::{Bay, PLAN};

// Default pin map.
const FRONT_STEP: u32 = 14;
const FRONT_DIR: u32 = 15;
const FRONT_EN: u32 = 18;
const REAR_STEP: u32 = 20;
const REAR_DIR: u32 = 21;
const REAR_EN: u32 = 16;
const RELAY: u32 = 17;

fn first_index(bay: &Bay, from: usize, pin: u32) -> usize {
    bay.bus.events()[from..]
        .iter()
        .position(|e| e.pin == pin && e.level == Level::High)
        .map(|i| i + from)
        .unwrap()
}

fn last_index(bay: &Bay, from: usize, pin: u32) -> usize {
    bay.bus.events()[from..]
        .iter()
        .rposition(|e| e.pin == pin && e.level == Level::High)
        .map(|i| i + from)
        .unwrap()
}

#[test]
fn held_detection_parks_once_and_aligns_coils() {
    let mut bay = Bay::new();
    let mark = bay.bus.events().len();
    bay.show_ev();

    assert_eq!(bay.step(), ControlState::Confirming);
    let confirmed_at = bay.clock.now();

    bay.step_until(ControlState::Parking, 200);
    let held = bay.clock.now() - confirmed_at;
    assert!(held >= Duration::from_secs(5), "parked after {held:?}");
    assert!(held <= Duration::from_millis(5_200), "parked after {held:?}");
    assert_eq!(bay.controller.sessions_started(), 1);

    assert_eq!(bay.step(), ControlState::Charging);
    assert_eq!(*bay.predictions.lock(), vec![(20.0, 25.0)]);
    assert_eq!(bay.controller.session().unwrap().plan, Some(PLAN));

    // Front first, then rear, both forward.
    assert_eq!(bay.pulses_since(mark, FRONT_STEP), 120);
    assert_eq!(bay.pulses_since(mark, REAR_STEP), 140);
    assert!(last_index(&bay, mark, FRONT_STEP) < first_index(&bay, mark, REAR_STEP));
    assert_eq!(bay.bus.level(FRONT_DIR), Some(Level::Low));
    assert_eq!(bay.bus.level(REAR_DIR), Some(Level::Low));

    // Relay closes after both moves; drivers de-energized.
    assert!(last_index(&bay, mark, REAR_STEP) < first_index(&bay, mark, RELAY));
    assert_eq!(bay.bus.level(RELAY), Some(Level::High));
    assert_eq!(bay.bus.level(FRONT_EN), Some(Level::Low));
    assert_eq!(bay.bus.level(REAR_EN), Some(Level::Low));
    assert_eq!(bay.lcd()[0], "Charging...");

    // Still holding the EV in view: no second session.
    for _ in 0..3 {
        assert_eq!(bay.step(), ControlState::Charging);
    }
    assert_eq!(bay.controller.sessions_started(), 1);
}

#[test]
fn departure_retracts_with_stored_plan_and_resets() {
    let mut bay = Bay::new();
    bay.park();

    bay.bus.set_distances(35.0, 40.0);
    let mark = bay.bus.events().len();

    assert_eq!(bay.step(), ControlState::Leaving);
    assert_eq!(bay.bus.level(RELAY), Some(Level::Low));
    assert_eq!(bay.lcd()[0], "Leaving...");

    assert_eq!(bay.step(), ControlState::Idle);

    // Rear first, then front, both reverse, same step counts.
    assert_eq!(bay.pulses_since(mark, REAR_STEP), 140);
    assert_eq!(bay.pulses_since(mark, FRONT_STEP), 120);
    assert!(last_index(&bay, mark, REAR_STEP) < first_index(&bay, mark, FRONT_STEP));
    assert_eq!(bay.bus.level(REAR_DIR), Some(Level::High));
    assert_eq!(bay.bus.level(FRONT_DIR), Some(Level::High));

    // Net zero displacement over the session.
    assert_eq!(bay.bus.rising_edges(FRONT_STEP), 2 * 120);
    assert_eq!(bay.bus.rising_edges(REAR_STEP), 2 * 140);

    assert_eq!(bay.shared.snapshot(), DetectionSnapshot::default());
    assert_eq!(bay.controller.debounce().started_at(), None);
    assert!(bay.controller.session().is_none());
    assert_eq!(bay.lcd()[0], "System Ready");

    // The predictor ran once for the whole session.
    assert_eq!(bay.predictions.lock().len(), 1);

    // Reset flags keep the controller idle.
    assert_eq!(bay.step(), ControlState::Idle);
}

#[test]
fn one_sided_departure_keeps_charging() {
    let mut bay = Bay::new();
    bay.park();

    bay.bus.set_distances(35.0, 20.0);
    for _ in 0..5 {
        assert_eq!(bay.step(), ControlState::Charging);
    }
    bay.bus.set_distances(20.0, 45.0);
    assert_eq!(bay.step(), ControlState::Charging);
    assert_eq!(bay.bus.level(RELAY), Some(Level::High));
}

#[test]
fn threshold_is_exclusive() {
    let mut bay = Bay::new();
    bay.park();

    bay.bus.set_distances(30.0, 30.0);
    assert_eq!(bay.step(), ControlState::Charging);
    bay.bus.set_distances(30.5, 30.5);
    assert_eq!(bay.step(), ControlState::Leaving);
}

#[test]
fn missing_echo_counts_as_departed() {
    let mut bay = Bay::new();
    bay.park();

    bay.bus.set_distances(f64::INFINITY, f64::INFINITY);
    assert_eq!(bay.step(), ControlState::Leaving);
}

#[test]
fn detection_drop_before_debounce_resets_timer() {
    let mut bay = Bay::new();
    bay.show_ev();
    assert_eq!(bay.step(), ControlState::Confirming);

    // Hold for ~2s, then lose the EV plate.
    for _ in 0..40 {
        assert_eq!(bay.step(), ControlState::Confirming);
    }
    bay.show_plain_car();
    assert_eq!(bay.step(), ControlState::Idle);
    assert_eq!(bay.controller.debounce().started_at(), None);

    // A new detection restarts the full debounce from its own start.
    bay.show_ev();
    assert_eq!(bay.step(), ControlState::Confirming);
    let restarted_at = bay.clock.now();
    assert_eq!(bay.controller.debounce().started_at(), Some(restarted_at));

    bay.step_until(ControlState::Parking, 200);
    assert!(bay.clock.now() - restarted_at >= Duration::from_secs(5));
    assert_eq!(bay.controller.sessions_started(), 1);
}

#[test]
fn plain_car_never_confirms() {
    let mut bay = Bay::new();
    bay.show_plain_car();
    for _ in 0..200 {
        assert_eq!(bay.step(), ControlState::Idle);
    }
    assert_eq!(bay.controller.debounce().started_at(), None);
}

#[test]
fn flags_ignored_once_parked() {
    let mut bay = Bay::new();
    bay.park();

    bay.show_plain_car();
    bay.shared.publish_frame(false, false, false, 0.0);
    for _ in 0..3 {
        assert_eq!(bay.step(), ControlState::Charging);
    }
    assert_eq!(bay.bus.level(RELAY), Some(Level::High));
}

#[test]
fn invalid_distance_reaches_predictor_as_sentinel() {
    let mut bay = Bay::new();
    bay.bus.set_distances(f64::INFINITY, 25.0);
    bay.park();

    let sentinel = bay.config.thresholds.invalid_distance_cm;
    assert_eq!(*bay.predictions.lock(), vec![(sentinel, 25.0)]);
}

#[test]
fn consecutive_sessions_get_new_ids() {
    let mut bay = Bay::new();
    bay.park();
    assert_eq!(bay.controller.session().unwrap().id, 1);

    bay.bus.set_distances(50.0, 50.0);
    bay.step_until(ControlState::Idle, 5);

    bay.bus.set_distances(20.0, 25.0);
    bay.park();
    assert_eq!(bay.controller.session().unwrap().id, 2);
    assert_eq!(bay.bus.rising_edges(FRONT_STEP), 3 * 120);
}
