//! Integration test: interrupt handling and guaranteed cleanup.
//!
//! Validates: a shutdown request at any point stops the controller, opens
//! the relay, de-energizes both motors, clears the display and releases the
//! driver.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use evc_common::config::EvcConfig;
use evc_common::hal::driver::{GpioDriver, HalError};
use evc_common::hal::types::Level;
use evc_common::shutdown::ShutdownToken;
use evc_common::time::{Clock, ManualClock};
use evc_control_unit::ControlError;
use evc_control_unit::cycle::Hardware;
use evc_control_unit::state::machine::ControlState;
use evc_hal::drivers::simulation::SimulationDriver;

use super::support::Bay;

#[test]
fn interrupt_mid_parking_opens_relay_and_releases() {
    // Trip when the rear driver is energized: front already moved, relay still open.
    let mut bay = Bay::tripping_on(16);
    bay.show_ev();

    bay.controller.run().unwrap();

    assert!(bay.token.is_tripped());
    assert_eq!(bay.controller.state(), ControlState::Parking);
    assert_eq!(bay.bus.rising_edges(14), 120);
    assert_eq!(bay.bus.rising_edges(20), 0);

    // Relay never closed and is forced open.
    assert_eq!(bay.bus.rising_edges(17), 0);
    assert_eq!(bay.bus.level(17), Some(Level::Low));
    assert_eq!(bay.bus.level(18), Some(Level::Low));
    assert_eq!(bay.bus.level(16), Some(Level::Low));

    assert!(bay.controller.hardware().is_released());
    assert!(bay.bus.is_shut_down());
    assert!(bay.lcd().iter().all(String::is_empty));
}

#[test]
fn interrupt_while_charging_forces_relay_open() {
    let mut bay = Bay::new();
    bay.park();
    assert_eq!(bay.bus.level(17), Some(Level::High));

    bay.token.trip();
    assert!(matches!(bay.controller.step(), Err(ControlError::Interrupted)));
    assert_eq!(bay.bus.level(17), Some(Level::High));

    // run() on a tripped token stops during startup and still cleans up.
    bay.controller.run().unwrap();
    assert_eq!(bay.bus.level(17), Some(Level::Low));
    assert!(bay.bus.is_shut_down());
}

#[test]
fn interrupt_while_idle_stops_run() {
    let mut bay = Bay::new();
    let token = bay.token.clone();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.trip();
    });

    bay.controller.run().unwrap();
    trigger.join().unwrap();

    assert_eq!(bay.controller.state(), ControlState::Idle);
    assert!(bay.bus.is_shut_down());
}

#[test]
fn startup_shows_ready_with_relay_open() {
    let mut bay = Bay::new();
    bay.controller.startup().unwrap();

    assert_eq!(bay.lcd()[0], "System Ready");
    assert_eq!(bay.bus.level(17), Some(Level::Low));
    assert_eq!(bay.clock.now(), Duration::from_secs(4));
}

#[test]
fn release_is_idempotent() {
    let config = EvcConfig::with_service_name("bay-test");
    let mut sim = SimulationDriver::new();
    sim.init(&config).unwrap();
    let bus = sim.bus().unwrap();

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let mut hw = Hardware::acquire(Box::new(sim), &config, clock, ShutdownToken::new()).unwrap();
    hw.actuators.set_relay(true).unwrap();

    hw.release();
    assert!(hw.is_released());
    assert_eq!(bus.level(17), Some(Level::Low));
    let events = bus.events().len();

    hw.release();
    drop(hw);
    assert_eq!(bus.events().len(), events);
}

#[test]
fn failed_claim_shuts_driver_down() {
    let mut config = EvcConfig::with_service_name("bay-test");
    // Bypasses validation: relay shares the front step pin.
    config.pins.relay = config.pins.front_motor.step;

    let mut sim = SimulationDriver::new();
    sim.init(&config).unwrap();
    let bus = sim.bus().unwrap();

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let result = Hardware::acquire(Box::new(sim), &config, clock, ShutdownToken::new());

    assert!(matches!(
        result,
        Err(ControlError::Hal(HalError::PinClaimed(14)))
    ));
    assert!(bus.is_shut_down());
}

#[test]
fn sensor_fault_while_charging_is_not_a_departure() {
    // Front trigger line.
    let mut bay = Bay::failing_on(23);
    bay.park();
    let reverse_before = bay.bus.rising_edges(20);

    bay.fault.store(true, Ordering::SeqCst);
    assert!(matches!(
        bay.controller.step(),
        Err(ControlError::Hal(HalError::Io { pin: 23, .. }))
    ));

    // Still parked: relay closed, no retraction, shared state untouched.
    assert_eq!(bay.controller.state(), ControlState::Charging);
    assert_eq!(bay.bus.level(17), Some(Level::High));
    assert_eq!(bay.bus.rising_edges(20), reverse_before);
    assert!(bay.shared.snapshot().vehicle_confirmed());
    assert_ne!(bay.lcd()[0], "Leaving...");
}
