//! Linux sysfs GPIO driver module.

mod driver;

pub use driver::SysfsDriver;

use evc_common::hal::driver::GpioDriver;

/// Factory function to create a sysfs driver instance.
pub fn create_driver() -> Box<dyn GpioDriver> {
    Box::new(SysfsDriver::new())
}
