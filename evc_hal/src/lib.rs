//! # EVC HAL Library
//!
//! Hardware backends for the coil alignment controller. Backends implement
//! the `GpioDriver` trait defined in `evc_common::hal::driver` and hand out
//! pin and display capabilities to the controller.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Backend implementations (`simulation`, `sysfs`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  evc_control_unit                                        │
//! │   DistanceSensor / ActuatorController / DisplayController│
//! └───────────────┬──────────────────────────────────────────┘
//!                 │ OutputPin / EchoInput / TextDisplay
//!                 ▼
//! ┌──────────────────────────┐    ┌─────────────────────────┐
//! │  GpioDriver (trait obj)  │◄───│  DriverRegistry         │
//! └──────────────────────────┘    └─────────────────────────┘
//!        ▲               ▲
//!   simulation         sysfs
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;
