//! Linux sysfs GPIO driver.
//!
//! Pins are exported through `<gpio_root>/export`, configured through
//! `gpioN/direction` and driven or sampled through `gpioN/value`. The status
//! display is mirrored to the log, since the character LCD sits behind an
//! I2C expander this backend does not drive.

use evc_common::config::EvcConfig;
use evc_common::hal::driver::{EchoInput, GpioDriver, HalError, OutputPin, TextDisplay};
use evc_common::hal::types::Level;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sysfs GPIO driver implementing the GpioDriver trait.
pub struct SysfsDriver {
    root: PathBuf,
    exported: Vec<u32>,
    display_rows: usize,
    initialized: bool,
}

impl SysfsDriver {
    /// Create an uninitialized sysfs driver.
    pub fn new() -> Self {
        Self {
            root: PathBuf::new(),
            exported: Vec::new(),
            display_rows: 0,
            initialized: false,
        }
    }

    fn ensure_init(&self) -> Result<(), HalError> {
        if self.initialized {
            Ok(())
        } else {
            Err(HalError::InitFailed("sysfs driver not initialized".to_string()))
        }
    }

    /// Export `pin` (if needed) and return its directory.
    fn export(&mut self, pin: u32) -> Result<PathBuf, HalError> {
        self.ensure_init()?;
        if self.exported.contains(&pin) {
            return Err(HalError::PinClaimed(pin));
        }

        let dir = self.root.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(self.root.join("export"), pin.to_string())
                .map_err(|e| io_error(pin, "export", e))?;
        }
        self.exported.push(pin);
        Ok(dir)
    }
}

impl Default for SysfsDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioDriver for SysfsDriver {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &EvcConfig) -> Result<(), HalError> {
        let root = &config.hal.gpio_root;
        if !root.join("export").exists() {
            return Err(HalError::InitFailed(format!(
                "{} has no export file (is sysfs GPIO available?)",
                root.display()
            )));
        }

        self.root = root.clone();
        self.display_rows = config.display.rows;
        self.initialized = true;
        info!("Sysfs GPIO driver initialized at {}", root.display());
        Ok(())
    }

    fn output(&mut self, pin: u32, initial: Level) -> Result<Box<dyn OutputPin>, HalError> {
        let dir = self.export(pin)?;
        // "low"/"high" sets direction and initial value without a glitch.
        let direction = if initial.is_high() { "high" } else { "low" };
        fs::write(dir.join("direction"), direction).map_err(|e| io_error(pin, "direction", e))?;

        let value = OpenOptions::new()
            .write(true)
            .open(dir.join("value"))
            .map_err(|e| io_error(pin, "open value", e))?;
        debug!("Sysfs output pin {} exported (initial {})", pin, initial);
        Ok(Box::new(SysfsOutput { pin, value }))
    }

    fn echo_input(&mut self, pin: u32) -> Result<Box<dyn EchoInput>, HalError> {
        let dir = self.export(pin)?;
        fs::write(dir.join("direction"), "in").map_err(|e| io_error(pin, "direction", e))?;

        let value = File::open(dir.join("value")).map_err(|e| io_error(pin, "open value", e))?;
        debug!("Sysfs echo pin {} exported", pin);
        Ok(Box::new(SysfsInput {
            pin,
            value,
            buf: String::with_capacity(4),
        }))
    }

    fn display(&mut self) -> Result<Box<dyn TextDisplay>, HalError> {
        self.ensure_init()?;
        Ok(Box::new(LogDisplay {
            rows: vec![String::new(); self.display_rows],
        }))
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        if self.exported.is_empty() {
            return Ok(());
        }
        info!("Releasing {} sysfs GPIO pins", self.exported.len());
        let unexport = self.root.join("unexport");
        for pin in self.exported.drain(..) {
            if let Err(e) = fs::write(&unexport, pin.to_string()) {
                warn!("Failed to unexport pin {}: {}", pin, e);
            }
        }
        Ok(())
    }
}

fn io_error(pin: u32, op: &str, e: std::io::Error) -> HalError {
    HalError::Io {
        pin,
        reason: format!("{op}: {e}"),
    }
}

struct SysfsOutput {
    pin: u32,
    value: File,
}

impl OutputPin for SysfsOutput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn write(&mut self, level: Level) -> Result<(), HalError> {
        self.value
            .rewind()
            .and_then(|_| self.value.write_all(level.as_sysfs().as_bytes()))
            .map_err(|e| io_error(self.pin, "write value", e))
    }
}

struct SysfsInput {
    pin: u32,
    value: File,
    buf: String,
}

impl SysfsInput {
    fn read_level(&mut self) -> Result<Level, HalError> {
        self.buf.clear();
        self.value
            .rewind()
            .and_then(|_| self.value.read_to_string(&mut self.buf))
            .map_err(|e| io_error(self.pin, "read value", e))?;
        Ok(Level::from(self.buf.trim() == "1"))
    }
}

impl EchoInput for SysfsInput {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn wait_for(&mut self, level: Level, timeout: Duration) -> Result<Option<Duration>, HalError> {
        let start = Instant::now();
        loop {
            if self.read_level()? == level {
                return Ok(Some(start.elapsed()));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::hint::spin_loop();
        }
    }
}

/// Display that mirrors every row update to the log.
struct LogDisplay {
    rows: Vec<String>,
}

impl TextDisplay for LogDisplay {
    fn clear(&mut self) -> Result<(), HalError> {
        self.rows.iter_mut().for_each(String::clear);
        Ok(())
    }

    fn write_row(&mut self, row: usize, text: &str) -> Result<(), HalError> {
        let slot = self
            .rows
            .get_mut(row)
            .ok_or_else(|| HalError::Display(format!("row {row} out of range")))?;
        *slot = text.to_string();
        info!(target: "evc::lcd", row, "{}", text);
        Ok(())
    }
}
