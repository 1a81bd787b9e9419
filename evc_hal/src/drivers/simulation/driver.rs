//! Simulation driver implementation.
//!
//! The `SimulationDriver` implements the `GpioDriver` trait on top of a
//! [`SimBus`], so the controller can run end to end without a Raspberry Pi.

use super::bus::{SensorPosition, SimBus};
use evc_common::config::EvcConfig;
use evc_common::hal::driver::{EchoInput, GpioDriver, HalError, OutputPin, TextDisplay};
use evc_common::hal::types::Level;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Simulation driver implementing the GpioDriver trait.
pub struct SimulationDriver {
    name: &'static str,
    version: &'static str,
    bus: Option<Arc<SimBus>>,
}

impl SimulationDriver {
    /// Create an uninitialized simulation driver.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            bus: None,
        }
    }

    /// Shared world model; available after `init()`.
    pub fn bus(&self) -> Option<Arc<SimBus>> {
        self.bus.clone()
    }

    fn initialized_bus(&self) -> Result<Arc<SimBus>, HalError> {
        self.bus
            .clone()
            .ok_or_else(|| HalError::InitFailed("simulation driver not initialized".to_string()))
    }

    fn claim(&self, pin: u32) -> Result<Arc<SimBus>, HalError> {
        let bus = self.initialized_bus()?;
        if !bus.claim(pin) {
            return Err(HalError::PinClaimed(pin));
        }
        Ok(bus)
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &EvcConfig) -> Result<(), HalError> {
        let bus = SimBus::new(config.display.rows, config.thresholds.cm_per_second);
        bus.add_sensor(
            SensorPosition::Front,
            config.pins.front_sensor.trigger,
            config.pins.front_sensor.echo,
        );
        bus.add_sensor(
            SensorPosition::Rear,
            config.pins.rear_sensor.trigger,
            config.pins.rear_sensor.echo,
        );
        bus.set_distance_script(config.simulation.distances.clone());

        info!(
            "Simulation driver initialized ({} distance steps, {}x{} display)",
            config.simulation.distances.len(),
            config.display.columns,
            config.display.rows
        );
        self.bus = Some(Arc::new(bus));
        Ok(())
    }

    fn output(&mut self, pin: u32, initial: Level) -> Result<Box<dyn OutputPin>, HalError> {
        let bus = self.claim(pin)?;
        let mut output = SimOutput { pin, bus };
        output.write(initial)?;
        debug!("Sim output pin {} claimed (initial {})", pin, initial);
        Ok(Box::new(output))
    }

    fn echo_input(&mut self, pin: u32) -> Result<Box<dyn EchoInput>, HalError> {
        let bus = self.claim(pin)?;
        debug!("Sim echo pin {} claimed", pin);
        Ok(Box::new(SimEcho { pin, bus }))
    }

    fn display(&mut self) -> Result<Box<dyn TextDisplay>, HalError> {
        let bus = self.initialized_bus()?;
        bus.clear_lcd();
        Ok(Box::new(SimDisplay { bus }))
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        if let Some(bus) = &self.bus {
            if !bus.is_shut_down() {
                info!("Shutting down simulation driver");
                bus.release_all();
            }
        }
        Ok(())
    }
}

struct SimOutput {
    pin: u32,
    bus: Arc<SimBus>,
}

impl OutputPin for SimOutput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn write(&mut self, level: Level) -> Result<(), HalError> {
        trace!("sim pin {} <- {}", self.pin, level);
        if self.bus.write_pin(self.pin, level) {
            Ok(())
        } else {
            Err(HalError::Io {
                pin: self.pin,
                reason: "driver shut down".to_string(),
            })
        }
    }
}

struct SimEcho {
    pin: u32,
    bus: Arc<SimBus>,
}

impl EchoInput for SimEcho {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn wait_for(&mut self, level: Level, timeout: Duration) -> Result<Option<Duration>, HalError> {
        Ok(self.bus.wait_echo(self.pin, level, timeout))
    }
}

struct SimDisplay {
    bus: Arc<SimBus>,
}

impl TextDisplay for SimDisplay {
    fn clear(&mut self) -> Result<(), HalError> {
        self.bus.clear_lcd();
        Ok(())
    }

    fn write_row(&mut self, row: usize, text: &str) -> Result<(), HalError> {
        debug!("LCD[{}] {}", row, text);
        if self.bus.write_lcd_row(row, text) {
            Ok(())
        } else {
            Err(HalError::Display(format!("row {row} out of range")))
        }
    }
}
