//! EVC Common Library
//!
//! Shared building blocks for the EV charging coil alignment workspace.
//!
//! # Module Structure
//!
//! - [`shared_state`] - Detection cells shared by the vision worker and the controller
//! - [`config`] - Configuration loading and the unified `EvcConfig`
//! - [`hal`] - Hardware capability traits implemented by `evc_hal`
//! - [`time`] - Monotonic clock abstraction (system and manual)
//! - [`shutdown`] - Interrupt-driven shutdown token

pub mod config;
pub mod consts;
pub mod hal;
pub mod shared_state;
pub mod shutdown;
pub mod time;
