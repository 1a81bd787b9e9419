//! Integration test: properties over generated inputs.
//!
//! Validates: the debounce rule for any observation sequence, net-zero coil
//! displacement for any step plan, and the two-sided departure rule for any
//! pair of readings.

use std::time::Duration;

use proptest::prelude::*;

use evc_common::hal::types::Level;
use evc_control_unit::predictor::StepPlan;
use evc_control_unit::sensor::{Distance, DistanceMeasurement};
use evc_control_unit::state::debounce::{DebounceStatus, DebounceTimer};
use evc_control_unit::state::machine::ControlState;

use super::support::Bay;

const FRONT_STEP: u32 = 14;
const FRONT_DIR: u32 = 15;
const REAR_STEP: u32 = 20;
const REAR_DIR: u32 = 21;
const DEPARTURE_CM: f64 = 30.0;

fn reading() -> impl Strategy<Value = Distance> {
    prop_oneof![
        1 => Just(Distance::Invalid),
        4 => (0.0..120.0f64).prop_map(Distance::Valid),
        1 => prop::sample::select(vec![29.99, 30.0, 30.01]).prop_map(Distance::Valid),
    ]
}

fn far(d: Distance) -> bool {
    match d {
        Distance::Invalid => true,
        Distance::Valid(cm) => cm > DEPARTURE_CM,
    }
}

proptest! {
    /// Elapsed exactly when every observation since the run started was
    /// positive and the run has lasted the full hold time.
    #[test]
    fn debounce_elapses_only_after_unbroken_hold(
        hold_ms in 0u64..2_000,
        polls in prop::collection::vec((any::<bool>(), 0u64..600), 1..120),
    ) {
        let hold = Duration::from_millis(hold_ms);
        let mut timer = DebounceTimer::new(hold);
        let mut now = Duration::ZERO;
        let mut run_start: Option<Duration> = None;

        for (confirmed, dt_ms) in polls {
            now += Duration::from_millis(dt_ms);
            let status = timer.observe(confirmed, now);

            if !confirmed {
                run_start = None;
                prop_assert_eq!(status, DebounceStatus::Cleared);
                prop_assert_eq!(timer.started_at(), None);
                continue;
            }
            match run_start {
                None => {
                    run_start = Some(now);
                    prop_assert_eq!(status, DebounceStatus::Started);
                }
                Some(start) => {
                    let expected = if now - start >= hold {
                        DebounceStatus::Elapsed
                    } else {
                        DebounceStatus::Accumulating
                    };
                    prop_assert_eq!(status, expected);
                }
            }
            prop_assert_eq!(timer.started_at(), run_start);
        }
    }

    /// Departure fires iff both sides read beyond the threshold.
    #[test]
    fn departure_needs_both_sides_beyond_threshold(front in reading(), rear in reading()) {
        let m = DistanceMeasurement { front, rear };
        prop_assert_eq!(m.vehicle_departed(DEPARTURE_CM), far(front) && far(rear));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever plan parks the coils, leaving reverses exactly that plan.
    #[test]
    fn retraction_mirrors_any_plan(steps_front in 0u32..400, steps_rear in 0u32..400) {
        let plan = StepPlan { steps_front, steps_rear };
        let mut bay = Bay::with_plan(plan);
        bay.park();

        prop_assert_eq!(bay.bus.rising_edges(FRONT_STEP), u64::from(steps_front));
        prop_assert_eq!(bay.bus.rising_edges(REAR_STEP), u64::from(steps_rear));

        bay.bus.set_distances(45.0, 45.0);
        let mark = bay.bus.events().len();
        bay.step_until(ControlState::Idle, 5);

        prop_assert_eq!(bay.pulses_since(mark, FRONT_STEP), steps_front as usize);
        prop_assert_eq!(bay.pulses_since(mark, REAR_STEP), steps_rear as usize);
        prop_assert_eq!(bay.bus.level(FRONT_DIR), Some(Level::High));
        prop_assert_eq!(bay.bus.level(REAR_DIR), Some(Level::High));
        prop_assert!(bay.controller.session().is_none());
    }
}
