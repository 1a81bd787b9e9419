//! Remote charge status.
//!
//! The charging station publishes battery level and remaining time to a
//! Firestore document. One fetch is one blocking GET; the response uses the
//! Firestore REST encoding:
//!
//! ```json
//! {"fields": {"batteryLevel": {"doubleValue": 67.5},
//!             "remainingTime": {"integerValue": "45"}}}
//! ```
//!
//! Any failure (transport, non-200 status, unexpected body) is reported as a
//! [`TelemetryError`]; the controller turns it into an empty [`ChargeStatus`]
//! and keeps its cadence.

use evc_common::config::TelemetryConfig;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Latest charge status. Both fields are `None` after a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChargeStatus {
    pub battery_percent: Option<f64>,
    pub remaining_minutes: Option<i64>,
}

impl ChargeStatus {
    /// Status shown when the fetch failed.
    pub const fn unavailable() -> Self {
        Self {
            battery_percent: None,
            remaining_minutes: None,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.battery_percent.is_none() && self.remaining_minutes.is_none()
    }
}

/// Why a fetch produced no status.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Connection, timeout or TLS failure.
    #[error("telemetry request failed: {0}")]
    Transport(String),

    /// Server answered with something other than 200.
    #[error("telemetry endpoint returned HTTP {0}")]
    Status(u16),

    /// Body was not the expected document.
    #[error("unexpected telemetry body: {0}")]
    Body(String),
}

/// Source of charge status, polled by the controller while charging.
pub trait TelemetrySource: Send {
    fn fetch(&mut self) -> Result<ChargeStatus, TelemetryError>;
}

/// Fetch once, logging and absorbing any failure.
pub fn fetch_or_unavailable(source: &mut dyn TelemetrySource) -> ChargeStatus {
    match source.fetch() {
        Ok(status) => {
            debug!(
                "Telemetry: battery {:?}%, remaining {:?}min",
                status.battery_percent, status.remaining_minutes
            );
            status
        }
        Err(e) => {
            warn!("Telemetry fetch failed: {}", e);
            ChargeStatus::unavailable()
        }
    }
}

/// HTTP client for the Firestore status document.
pub struct ChargeTelemetryClient {
    http: reqwest::blocking::Client,
    url: String,
    battery_field: String,
    minutes_field: String,
}

impl ChargeTelemetryClient {
    /// Build the client; every request is bounded by `config.timeout_ms`.
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: config.url.clone(),
            battery_field: config.battery_field.clone(),
            minutes_field: config.minutes_field.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TelemetrySource for ChargeTelemetryClient {
    fn fetch(&mut self) -> Result<ChargeStatus, TelemetryError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TelemetryError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .map_err(|e| TelemetryError::Body(e.to_string()))?;
        parse_charge_body(&body, &self.battery_field, &self.minutes_field)
    }
}

/// Extract the status from a Firestore document body.
///
/// The battery level is read from `doubleValue` (falling back to
/// `integerValue` for whole percentages); the remaining time from
/// `integerValue`. Numbers and numeric strings are both accepted.
pub fn parse_charge_body(
    body: &Value,
    battery_field: &str,
    minutes_field: &str,
) -> Result<ChargeStatus, TelemetryError> {
    let fields = body
        .get("fields")
        .ok_or_else(|| TelemetryError::Body("missing `fields`".to_string()))?;

    let battery = fields
        .get(battery_field)
        .and_then(|f| f.get("doubleValue").or_else(|| f.get("integerValue")))
        .and_then(as_f64)
        .ok_or_else(|| TelemetryError::Body(format!("`{battery_field}` is not numeric")))?;

    let minutes = fields
        .get(minutes_field)
        .and_then(|f| f.get("integerValue"))
        .and_then(as_i64)
        .ok_or_else(|| TelemetryError::Body(format!("`{minutes_field}` is not an integer")))?;

    Ok(ChargeStatus {
        battery_percent: Some(battery),
        remaining_minutes: Some(minutes),
    })
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
