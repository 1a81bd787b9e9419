//! Simulation driver module.
//!
//! Software stand-in for the charging bay: pins, two ultrasonic sensors
//! with a scripted distance timeline, and a 2-row LCD.

mod bus;
mod driver;

pub use bus::{PinEvent, SensorPosition, SimBus};
pub use driver::SimulationDriver;

use evc_common::hal::driver::GpioDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn GpioDriver> {
    Box::new(SimulationDriver::new())
}
