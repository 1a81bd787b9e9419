//! Stepper motors and the charging relay.
//!
//! Each coil carriage is driven by a step/direction/enable stepper driver.
//! A move energizes the driver, emits `steps` pulses at the configured
//! half-period and de-energizes it again. The enable line is released on
//! every exit path: normal completion, pin faults and shutdown requests.

use evc_common::hal::driver::OutputPin;
use evc_common::hal::types::Level;
use evc_common::shutdown::ShutdownToken;
use evc_common::time::Clock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::ControlError;

/// Which coil carriage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorId {
    Front,
    Rear,
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotorId::Front => "front",
            MotorId::Rear => "rear",
        })
    }
}

/// Travel direction. Forward moves the coil under the car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Level of the direction pin.
    pub const fn level(self) -> Level {
        match self {
            Direction::Forward => Level::Low,
            Direction::Reverse => Level::High,
        }
    }
}

/// Pins of one stepper driver.
pub struct StepperMotor {
    pub step: Box<dyn OutputPin>,
    pub direction: Box<dyn OutputPin>,
    pub enable: Box<dyn OutputPin>,
}

/// De-energizes a driver when dropped.
struct EnableGuard<'a> {
    motor: MotorId,
    enable: &'a mut Box<dyn OutputPin>,
    armed: bool,
}

impl<'a> EnableGuard<'a> {
    fn energize(motor: MotorId, enable: &'a mut Box<dyn OutputPin>) -> Result<Self, ControlError> {
        // Armed before the write: a failed write still gets a release attempt.
        let mut guard = Self {
            motor,
            enable,
            armed: true,
        };
        guard.enable.write(Level::High)?;
        Ok(guard)
    }

    fn release(mut self) -> Result<(), ControlError> {
        self.armed = false;
        self.enable.write(Level::Low)?;
        Ok(())
    }
}

impl Drop for EnableGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.enable.write(Level::Low) {
                error!("Failed to de-energize {} motor: {}", self.motor, e);
            }
        }
    }
}

/// Owns both motors and the relay.
pub struct ActuatorController {
    front: StepperMotor,
    rear: StepperMotor,
    relay: Box<dyn OutputPin>,
    relay_on: bool,
    half_period: Duration,
    clock: Arc<dyn Clock>,
    token: ShutdownToken,
}

impl ActuatorController {
    /// Pins are expected at rest: enable low, relay open.
    pub fn new(
        front: StepperMotor,
        rear: StepperMotor,
        relay: Box<dyn OutputPin>,
        half_period: Duration,
        clock: Arc<dyn Clock>,
        token: ShutdownToken,
    ) -> Self {
        Self {
            front,
            rear,
            relay,
            relay_on: false,
            half_period,
            clock,
            token,
        }
    }

    /// Move `motor` by `steps` pulses. Blocks for `steps * 2 * half_period`.
    ///
    /// Returns the number of pulses emitted. A shutdown request stops the
    /// pulse train with [`ControlError::Interrupted`].
    pub fn move_motor(
        &mut self,
        motor: MotorId,
        direction: Direction,
        steps: u32,
    ) -> Result<u32, ControlError> {
        let pins = match motor {
            MotorId::Front => &mut self.front,
            MotorId::Rear => &mut self.rear,
        };
        debug!("Moving {} motor {:?} by {} steps", motor, direction, steps);

        pins.direction.write(direction.level())?;
        let guard = EnableGuard::energize(motor, &mut pins.enable)?;

        for done in 0..steps {
            if self.token.is_tripped() {
                warn!(
                    "{} motor stopped after {}/{} steps: shutdown requested",
                    motor, done, steps
                );
                return Err(ControlError::Interrupted);
            }
            pins.step.write(Level::High)?;
            self.clock.sleep(self.half_period);
            pins.step.write(Level::Low)?;
            self.clock.sleep(self.half_period);
        }

        guard.release()?;
        Ok(steps)
    }

    /// Close (`true`) or open the charging relay.
    pub fn set_relay(&mut self, on: bool) -> Result<(), ControlError> {
        self.relay.write(Level::from(on))?;
        self.relay_on = on;
        info!("Charging relay {}", if on { "closed" } else { "open" });
        Ok(())
    }

    pub fn relay_on(&self) -> bool {
        self.relay_on
    }

    /// Open the relay and de-energize both motors, whatever the last known
    /// state. Failures are logged; every pin is attempted.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.relay.write(Level::Low) {
            error!("Failed to open charging relay: {}", e);
        }
        self.relay_on = false;

        for (motor, pins) in [(MotorId::Front, &mut self.front), (MotorId::Rear, &mut self.rear)] {
            if let Err(e) = pins.enable.write(Level::Low) {
                error!("Failed to de-energize {} motor: {}", motor, e);
            }
        }
    }
}
