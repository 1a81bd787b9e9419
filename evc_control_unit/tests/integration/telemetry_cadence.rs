//! Integration test: telemetry while charging.
//!
//! Validates: one fetch per poll, "Data Error" exactly when the status is
//! empty, and an unchanged poll cadence across failures.

use std::time::Duration;

use evc_common::time::Clock;
use evc_control_unit::state::machine::ControlState;
use evc_control_unit::telemetry::{ChargeStatus, TelemetryError};

use super::support::Bay;

const POLL: Duration = Duration::from_secs(3);
/// Two trigger pulses per departure check.
const MEASURE_SLACK: Duration = Duration::from_millis(1);

#[test]
fn failures_show_data_error_and_keep_polling() {
    let mut bay = Bay::new();
    bay.park();

    bay.telemetry.push(Err(TelemetryError::Transport("connection refused".into())));
    bay.telemetry.push(Err(TelemetryError::Status(503)));
    bay.telemetry.push(Err(TelemetryError::Body("missing `fields`".into())));
    bay.telemetry.push(Ok(ChargeStatus {
        battery_percent: Some(81.34),
        remaining_minutes: Some(12),
    }));

    for _ in 0..3 {
        let before = bay.clock.now();
        assert_eq!(bay.step(), ControlState::Charging);
        let took = bay.clock.now() - before;
        assert!(took >= POLL && took < POLL + MEASURE_SLACK, "poll took {took:?}");
        assert_eq!(bay.lcd(), vec!["Data Error".to_string(), String::new()]);
    }

    assert_eq!(bay.step(), ControlState::Charging);
    assert_eq!(bay.lcd(), vec!["Batt: 81.3%".to_string(), "Time: 12min".to_string()]);
    assert_eq!(bay.telemetry.calls(), 4);
}

#[test]
fn healthy_status_is_displayed_every_poll() {
    let mut bay = Bay::new();
    bay.park();

    for n in 1..=5 {
        assert_eq!(bay.step(), ControlState::Charging);
        assert_eq!(bay.telemetry.calls(), n);
        assert_eq!(bay.lcd(), vec!["Batt: 67.5%".to_string(), "Time: 45min".to_string()]);
    }
}

#[test]
fn telemetry_is_not_polled_outside_charging() {
    let mut bay = Bay::new();
    bay.show_ev();
    bay.step_until(ControlState::Parking, 200);
    assert_eq!(bay.telemetry.calls(), 0);

    bay.step();
    assert_eq!(bay.telemetry.calls(), 0);

    // Departure poll fetches once, retraction never.
    bay.bus.set_distances(40.0, 40.0);
    assert_eq!(bay.step(), ControlState::Leaving);
    assert_eq!(bay.step(), ControlState::Idle);
    assert_eq!(bay.telemetry.calls(), 1);
}
