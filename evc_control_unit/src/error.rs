//! Controller error taxonomy.
//!
//! Soft failures (sensor timeouts, telemetry errors) never reach this type:
//! they are absorbed where they happen. `ControlError` covers what ends the
//! control loop: hardware faults and the interrupt-driven shutdown.

use evc_common::hal::driver::HalError;
use thiserror::Error;

use crate::predictor::PredictorError;
use crate::telemetry::TelemetryError;

/// Error ending (or preventing) a controller run.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Pin or display fault.
    #[error("hardware fault: {0}")]
    Hal(#[from] HalError),

    /// Predictor could not be built.
    #[error("step predictor unavailable: {0}")]
    Predictor(#[from] PredictorError),

    /// Telemetry client could not be built.
    #[error("telemetry client unavailable: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Shutdown requested while a blocking operation was in progress.
    #[error("interrupted by shutdown request")]
    Interrupted,
}

impl ControlError {
    /// True for the orderly interrupt path.
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, ControlError::Interrupted)
    }
}
