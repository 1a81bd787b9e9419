//! GPIO driver trait, pin capabilities and error types.
//!
//! This module defines:
//! - `GpioDriver` trait - Interface for pluggable hardware backends
//! - `OutputPin`, `EchoInput`, `TextDisplay` - capabilities handed out by a driver
//! - `HalError` enum - Error types for hardware operations
//! - `DriverFactory` type alias - Factory function type

use crate::config::EvcConfig;
use crate::hal::types::Level;
use std::time::Duration;
use thiserror::Error;

/// Error types for hardware operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Hardware communication error
    #[error("Hardware communication error on pin {pin}: {reason}")]
    Io { pin: u32, reason: String },

    /// Display communication error
    #[error("Display error: {0}")]
    Display(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Pin already claimed by another capability
    #[error("Pin {0} already claimed")]
    PinClaimed(u32),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn GpioDriver>;

/// Digital output (trigger, step, direction, enable, relay).
pub trait OutputPin: Send {
    /// Pin number (BCM).
    fn pin(&self) -> u32;

    /// Drive the pin.
    fn write(&mut self, level: Level) -> Result<(), HalError>;
}

/// Digital input with a bounded wait, used for ultrasonic echo lines.
pub trait EchoInput: Send {
    /// Pin number (BCM).
    fn pin(&self) -> u32;

    /// Wait until the input reads `level`.
    ///
    /// Returns the time spent waiting, or `Ok(None)` if `timeout` elapsed
    /// first. Never blocks longer than `timeout`.
    fn wait_for(&mut self, level: Level, timeout: Duration) -> Result<Option<Duration>, HalError>;
}

/// Row-addressable character display.
pub trait TextDisplay: Send {
    /// Blank every row.
    fn clear(&mut self) -> Result<(), HalError>;

    /// Overwrite row `row` starting at column 0.
    fn write_row(&mut self, row: usize, text: &str) -> Result<(), HalError>;
}

/// Trait defining the interface for hardware backends.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before any capability is requested
/// 2. `output()` / `echo_input()` / `display()` - Claim capabilities
/// 3. `shutdown()` - Release every claimed pin and the display
///
/// `shutdown()` must be safe to call more than once.
pub trait GpioDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation", "sysfs").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Prepare the backend.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` if the hardware cannot be opened.
    fn init(&mut self, config: &EvcConfig) -> Result<(), HalError>;

    /// Claim `pin` as an output, driven to `initial` immediately.
    fn output(&mut self, pin: u32, initial: Level) -> Result<Box<dyn OutputPin>, HalError>;

    /// Claim `pin` as an echo input.
    fn echo_input(&mut self, pin: u32) -> Result<Box<dyn EchoInput>, HalError>;

    /// Claim the status display.
    fn display(&mut self) -> Result<Box<dyn TextDisplay>, HalError>;

    /// Release all hardware resources.
    fn shutdown(&mut self) -> Result<(), HalError>;
}
