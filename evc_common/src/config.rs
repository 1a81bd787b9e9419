//! Configuration loading and the unified EVC configuration.
//!
//! Every tunable of the system (pin numbers, debounce and dwell durations,
//! distance thresholds, telemetry endpoint, predictor backend, vision labels,
//! simulation timelines) lives in a single TOML file. All sections except
//! `[shared]` are optional and default to the values the charging bay was
//! commissioned with.
//!
//! # Usage
//!
//! ```rust,no_run
//! use evc_common::config::{ConfigLoader, ConfigError, EvcConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = EvcConfig::load(Path::new("config/evc.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::consts::{
    DEFAULT_DISPLAY_COLUMNS, DEFAULT_DISPLAY_ROWS, DEFAULT_TELEMETRY_URL, HALF_SPEED_OF_SOUND_CM_S,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, per-pulse tracing.
    Trace,
    /// Per-poll detail (distances, telemetry payloads).
    Debug,
    /// State transitions and lifecycle.
    #[default]
    Info,
    /// Soft failures (sensor timeouts, telemetry errors).
    Warn,
    /// Fatal errors only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common fields identifying this controller instance.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "evc-bay-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier, used in logs.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Hardware backend ───────────────────────────────────────────────

/// `[hal]`: which hardware backend to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    /// Registered driver name (`simulation`, `sysfs`).
    pub driver: String,
    /// Root of the sysfs GPIO tree (sysfs driver only).
    pub gpio_root: PathBuf,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            driver: "simulation".to_string(),
            gpio_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

// ─── Pins ───────────────────────────────────────────────────────────

/// Trigger/echo pair of one ultrasonic sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltrasonicPins {
    /// Trigger output (BCM numbering).
    pub trigger: u32,
    /// Echo input (BCM numbering).
    pub echo: u32,
}

/// Step/direction/enable triple of one stepper driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperPins {
    /// Step pulse output.
    pub step: u32,
    /// Direction output (low = forward).
    pub direction: u32,
    /// Enable output (driver SLEEP pin, high = energized).
    pub enable: u32,
}

/// `[pins]`: physical I/O assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub front_sensor: UltrasonicPins,
    pub rear_sensor: UltrasonicPins,
    pub front_motor: StepperPins,
    pub rear_motor: StepperPins,
    /// Charging power relay output.
    pub relay: u32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            front_sensor: UltrasonicPins { trigger: 23, echo: 24 },
            rear_sensor: UltrasonicPins { trigger: 27, echo: 4 },
            front_motor: StepperPins {
                step: 14,
                direction: 15,
                enable: 18,
            },
            rear_motor: StepperPins {
                step: 20,
                direction: 21,
                enable: 16,
            },
            relay: 17,
        }
    }
}

impl PinConfig {
    /// All configured pins with their role names.
    pub fn assignments(&self) -> [(&'static str, u32); 11] {
        [
            ("front_sensor.trigger", self.front_sensor.trigger),
            ("front_sensor.echo", self.front_sensor.echo),
            ("rear_sensor.trigger", self.rear_sensor.trigger),
            ("rear_sensor.echo", self.rear_sensor.echo),
            ("front_motor.step", self.front_motor.step),
            ("front_motor.direction", self.front_motor.direction),
            ("front_motor.enable", self.front_motor.enable),
            ("rear_motor.step", self.rear_motor.step),
            ("rear_motor.direction", self.rear_motor.direction),
            ("rear_motor.enable", self.rear_motor.enable),
            ("relay", self.relay),
        ]
    }

    /// Reject pins assigned to more than one role.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (role, pin) in self.assignments() {
            if !seen.insert(pin) {
                return Err(ConfigError::ValidationError(format!(
                    "pin {pin} ({role}) is assigned more than once"
                )));
            }
        }
        Ok(())
    }
}

// ─── Timing ─────────────────────────────────────────────────────────

/// `[timing]`: every duration the controller waits on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Continuous car+EV observation required before parking [ms].
    pub debounce_ms: u64,
    /// Deadline for each echo edge [ms].
    pub echo_timeout_ms: u64,
    /// Ultrasonic trigger pulse width [µs].
    pub trigger_pulse_us: u64,
    /// Step pin high time and low time [µs].
    pub step_half_period_us: u64,
    /// Telemetry / departure poll period while charging [ms].
    pub charge_poll_ms: u64,
    /// Snapshot poll period while idle or confirming [ms].
    pub idle_poll_ms: u64,
    /// "System Ready" dwell at startup [ms].
    pub startup_dwell_ms: u64,
    /// "Parking..." dwell before measuring [ms].
    pub parking_dwell_ms: u64,
    /// "Charging..." dwell after relay closure [ms].
    pub charging_dwell_ms: u64,
    /// "Leaving..." dwell before retraction [ms].
    pub leaving_dwell_ms: u64,
    /// "System Ready" dwell after a session ends [ms].
    pub ready_dwell_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 5_000,
            echo_timeout_ms: 50,
            trigger_pulse_us: 10,
            step_half_period_us: 1_000,
            charge_poll_ms: 3_000,
            idle_poll_ms: 50,
            startup_dwell_ms: 4_000,
            parking_dwell_ms: 5_000,
            charging_dwell_ms: 2_000,
            leaving_dwell_ms: 2_000,
            ready_dwell_ms: 3_000,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_millis(self.echo_timeout_ms)
    }

    pub fn trigger_pulse(&self) -> Duration {
        Duration::from_micros(self.trigger_pulse_us)
    }

    pub fn step_half_period(&self) -> Duration {
        Duration::from_micros(self.step_half_period_us)
    }

    pub fn charge_poll(&self) -> Duration {
        Duration::from_millis(self.charge_poll_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn startup_dwell(&self) -> Duration {
        Duration::from_millis(self.startup_dwell_ms)
    }

    pub fn parking_dwell(&self) -> Duration {
        Duration::from_millis(self.parking_dwell_ms)
    }

    pub fn charging_dwell(&self) -> Duration {
        Duration::from_millis(self.charging_dwell_ms)
    }

    pub fn leaving_dwell(&self) -> Duration {
        Duration::from_millis(self.leaving_dwell_ms)
    }

    pub fn ready_dwell(&self) -> Duration {
        Duration::from_millis(self.ready_dwell_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("echo_timeout_ms", self.echo_timeout_ms),
            ("step_half_period_us", self.step_half_period_us),
            ("charge_poll_ms", self.charge_poll_ms),
            ("idle_poll_ms", self.idle_poll_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "timing.{name} must be > 0"
                )));
            }
        }
        Ok(())
    }
}

// ─── Thresholds ─────────────────────────────────────────────────────

/// `[thresholds]`: distance decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Both sensors above this distance in one poll means the car left [cm].
    pub departure_cm: f64,
    /// Value handed to the predictor for a timed-out reading [cm].
    pub invalid_distance_cm: f64,
    /// Echo high-time to distance factor (half the speed of sound) [cm/s].
    pub cm_per_second: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            departure_cm: 30.0,
            invalid_distance_cm: 999.0,
            cm_per_second: HALF_SPEED_OF_SOUND_CM_S,
        }
    }
}

// ─── Telemetry ──────────────────────────────────────────────────────

/// `[telemetry]`: remote charge status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Document URL (Firestore REST layout).
    pub url: String,
    /// Request timeout [ms]. Must stay below `timing.charge_poll_ms`: a
    /// fetch in flight delays shutdown by up to this long.
    pub timeout_ms: u64,
    /// Field holding the battery level (`fields.<name>.doubleValue`).
    pub battery_field: String,
    /// Field holding the remaining minutes (`fields.<name>.integerValue`).
    pub minutes_field: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TELEMETRY_URL.to_string(),
            timeout_ms: 2_500,
            battery_field: "batteryLevel".to_string(),
            minutes_field: "remainingTime".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ─── Predictor ──────────────────────────────────────────────────────

/// Affine distance→steps mapping for one motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

/// `[predictor]`: which step predictor backs the controller.
///
/// ```toml
/// [predictor]
/// kind = "mlp"
/// weights = "config/motor_predictor.json"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PredictorConfig {
    /// Pretrained dense network exported to JSON.
    Mlp { weights: PathBuf },
    /// Fixed affine mapping per motor (bench setups without a model).
    Linear {
        front: LinearCoefficients,
        rear: LinearCoefficients,
    },
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self::Linear {
            front: LinearCoefficients {
                scale: 6.0,
                offset: 0.0,
            },
            rear: LinearCoefficients {
                scale: 6.0,
                offset: 0.0,
            },
        }
    }
}

// ─── Display ────────────────────────────────────────────────────────

/// `[display]`: character LCD geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub columns: usize,
    pub rows: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            columns: DEFAULT_DISPLAY_COLUMNS,
            rows: DEFAULT_DISPLAY_ROWS,
        }
    }
}

// ─── Vision ─────────────────────────────────────────────────────────

/// Where the vision worker reads detections from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisionSourceKind {
    /// Replay `[[vision.script]]` steps.
    #[default]
    Script,
    /// JSON lines (`{"labels": [...]}`) from an external detector on stdin.
    Stdin,
}

/// One step of a scripted detection timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionStep {
    /// Offset from worker start [s].
    pub at_s: f64,
    /// Class labels reported from this offset on.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// `[vision]`: detector labels and source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub source: VisionSourceKind,
    pub car_label: String,
    pub ev_label: String,
    pub normal_label: String,
    /// Pause between frames [ms].
    pub frame_interval_ms: u64,
    pub script: Vec<DetectionStep>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            source: VisionSourceKind::Script,
            car_label: "Car".to_string(),
            ev_label: "EV license plate".to_string(),
            normal_label: "Normal license plate".to_string(),
            frame_interval_ms: 100,
            script: Vec::new(),
        }
    }
}

impl VisionConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

// ─── Simulation ─────────────────────────────────────────────────────

/// Distances seen by the simulated sensors from `at_s` on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceStep {
    pub at_s: f64,
    pub front_cm: f64,
    pub rear_cm: f64,
}

/// `[simulation]`: world model for the simulation driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub distances: Vec<DistanceStep>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            distances: vec![DistanceStep {
                at_s: 0.0,
                front_cm: 20.0,
                rear_cm: 25.0,
            }],
        }
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete EVC configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvcConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub hal: HalConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl EvcConfig {
    /// Configuration with every section at its default.
    pub fn with_service_name(service_name: &str) -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: service_name.to_string(),
            },
            hal: HalConfig::default(),
            pins: PinConfig::default(),
            timing: TimingConfig::default(),
            thresholds: ThresholdConfig::default(),
            telemetry: TelemetryConfig::default(),
            predictor: PredictorConfig::default(),
            display: DisplayConfig::default(),
            vision: VisionConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }

    /// Cross-field validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.pins.validate()?;
        self.timing.validate()?;

        if !(self.thresholds.departure_cm > 0.0) {
            return Err(ConfigError::ValidationError(
                "thresholds.departure_cm must be > 0".to_string(),
            ));
        }
        if !(self.thresholds.cm_per_second > 0.0) {
            return Err(ConfigError::ValidationError(
                "thresholds.cm_per_second must be > 0".to_string(),
            ));
        }
        if self.telemetry.timeout_ms == 0
            || self.telemetry.timeout_ms >= self.timing.charge_poll_ms
        {
            return Err(ConfigError::ValidationError(format!(
                "telemetry.timeout_ms must be > 0 and below timing.charge_poll_ms ({})",
                self.timing.charge_poll_ms
            )));
        }
        if self.telemetry.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "telemetry.url cannot be empty".to_string(),
            ));
        }
        if self.display.columns == 0 || self.display.rows < 2 {
            return Err(ConfigError::ValidationError(
                "display needs at least 1 column and 2 rows".to_string(),
            ));
        }
        if !is_sorted_by_offset(self.vision.script.iter().map(|s| s.at_s)) {
            return Err(ConfigError::ValidationError(
                "vision.script steps must be ordered by at_s".to_string(),
            ));
        }
        if !is_sorted_by_offset(self.simulation.distances.iter().map(|s| s.at_s)) {
            return Err(ConfigError::ValidationError(
                "simulation.distances steps must be ordered by at_s".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_sorted_by_offset(offsets: impl Iterator<Item = f64>) -> bool {
    let mut prev = f64::NEG_INFINITY;
    for at in offsets {
        if !(at >= prev) {
            return false;
        }
        prev = at;
    }
    true
}
