//! # EVC Control Unit Library
//!
//! Coil alignment controller for the wireless charging bay. Watches the
//! detection cells published by the vision worker, positions the front and
//! rear charging coils under a confirmed EV, closes the power relay, polls
//! charge telemetry and retracts the coils once the vehicle leaves.
//!
//! ## Session Lifecycle
//!
//! ```text
//! Idle ──car+EV──► Confirming ──5s held──► Parking ──coils in place──► Charging
//!  ▲                   │                                                  │
//!  └────flag lost──────┘                       both sensors > 30cm        │
//!  ▲                                                                      ▼
//!  └──────────────────────── retracted, state reset ◄──────────────── Leaving
//! ```
//!
//! ## Modules
//!
//! - [`sensor`] - Bounded-time ultrasonic ranging
//! - [`predictor`] - Distance → step count mapping (MLP, linear, closure)
//! - [`actuator`] - Stepper motors and charging relay
//! - [`display`] - Two-line operator display
//! - [`telemetry`] - Remote charge status fetch
//! - [`state`] - Lifecycle state machine and debounce timer
//! - [`cycle`] - Hardware ownership and the main control loop
//! - [`error`] - Controller error type

pub mod actuator;
pub mod cycle;
pub mod display;
pub mod error;
pub mod predictor;
pub mod sensor;
pub mod state;
pub mod telemetry;

pub use cycle::{Hardware, MainControlLoop};
pub use error::ControlError;
