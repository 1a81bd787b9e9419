//! State machine module root.
//!
//! - [`machine`] - Controller lifecycle: Idle → Confirming → Parking → Charging → Leaving
//! - [`debounce`] - Continuous-detection timer guarding the Parking entry

pub mod debounce;
pub mod machine;
