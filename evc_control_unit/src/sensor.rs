//! Ultrasonic ranging (HC-SR04 style trigger/echo).
//!
//! A measurement drives a short trigger pulse, then waits for the echo line
//! to rise and to fall. Each wait is bounded by the echo deadline; a missed
//! edge yields [`Distance::Invalid`] instead of blocking.

use evc_common::hal::driver::{EchoInput, HalError, OutputPin};
use evc_common::hal::types::Level;
use evc_common::time::Clock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One ranging result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    /// Distance to the vehicle body [cm].
    Valid(f64),
    /// No echo edge within the deadline.
    Invalid,
}

impl Distance {
    pub fn cm(self) -> Option<f64> {
        match self {
            Distance::Valid(cm) => Some(cm),
            Distance::Invalid => None,
        }
    }

    /// Value handed to the step predictor; `sentinel` stands in for a timeout.
    pub fn or_sentinel(self, sentinel: f64) -> f64 {
        match self {
            Distance::Valid(cm) => cm,
            Distance::Invalid => sentinel,
        }
    }

    /// Strictly farther than `threshold_cm`. A timeout counts as very far.
    pub fn exceeds(self, threshold_cm: f64) -> bool {
        match self {
            Distance::Valid(cm) => cm > threshold_cm,
            Distance::Invalid => true,
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Valid(cm) => write!(f, "{cm:.2}cm"),
            Distance::Invalid => f.write_str("invalid"),
        }
    }
}

/// Front and rear readings taken in the same poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceMeasurement {
    pub front: Distance,
    pub rear: Distance,
}

impl DistanceMeasurement {
    /// Both sides clear of the bay in this poll.
    pub fn vehicle_departed(&self, threshold_cm: f64) -> bool {
        self.front.exceeds(threshold_cm) && self.rear.exceeds(threshold_cm)
    }
}

/// Timing and conversion parameters shared by both sensors.
#[derive(Debug, Clone, Copy)]
pub struct SensorTiming {
    pub trigger_pulse: Duration,
    pub echo_timeout: Duration,
    pub cm_per_second: f64,
}

/// One ultrasonic sensor.
pub struct DistanceSensor {
    name: &'static str,
    trigger: Box<dyn OutputPin>,
    echo: Box<dyn EchoInput>,
    timing: SensorTiming,
    clock: Arc<dyn Clock>,
}

impl DistanceSensor {
    pub fn new(
        name: &'static str,
        trigger: Box<dyn OutputPin>,
        echo: Box<dyn EchoInput>,
        timing: SensorTiming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            trigger,
            echo,
            timing,
            clock,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take one reading. Blocks at most twice the echo deadline.
    ///
    /// A missed echo edge is [`Distance::Invalid`]. Pin faults are errors:
    /// they say nothing about where the vehicle is.
    pub fn measure(&mut self) -> Result<Distance, HalError> {
        self.pulse_trigger().inspect_err(|e| {
            warn!("{} sensor: trigger failed: {}", self.name, e);
        })?;

        let timeout = self.timing.echo_timeout;
        if self.echo.wait_for(Level::High, timeout)?.is_none() {
            debug!("{} sensor: no echo rise within {:?}", self.name, timeout);
            return Ok(Distance::Invalid);
        }

        match self.echo.wait_for(Level::Low, timeout)? {
            Some(high_time) => {
                let cm = round_cm(high_time.as_secs_f64() * self.timing.cm_per_second);
                debug!("{} sensor: {:.2}cm", self.name, cm);
                Ok(Distance::Valid(cm))
            }
            None => {
                debug!("{} sensor: echo did not fall within {:?}", self.name, timeout);
                Ok(Distance::Invalid)
            }
        }
    }

    fn pulse_trigger(&mut self) -> Result<(), HalError> {
        self.trigger.write(Level::High)?;
        self.clock.sleep(self.timing.trigger_pulse);
        self.trigger.write(Level::Low)
    }
}

fn round_cm(cm: f64) -> f64 {
    (cm * 100.0).round() / 100.0
}
