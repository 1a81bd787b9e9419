//! System-wide constants for the EVC workspace.
//!
//! Single source of truth for defaults shared across crates.

/// Echo high-time to distance factor: half the speed of sound [cm/s].
pub const HALF_SPEED_OF_SOUND_CM_S: f64 = 17_150.0;

/// Character LCD width.
pub const DEFAULT_DISPLAY_COLUMNS: usize = 16;

/// Character LCD height.
pub const DEFAULT_DISPLAY_ROWS: usize = 2;

/// Charge status document of the bay's vehicle.
pub const DEFAULT_TELEMETRY_URL: &str = "https://firestore.googleapis.com/v1/projects/ev-charge-monitor/databases/(default)/documents/charging/car1";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/evc.toml";
