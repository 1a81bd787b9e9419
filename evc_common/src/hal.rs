//! Hardware capability interfaces.
//!
//! The controller never touches GPIO registers, sysfs files or LCD chips
//! directly; it works against the traits in [`driver`], implemented by the
//! backends in `evc_hal`.

pub mod driver;
pub mod types;
