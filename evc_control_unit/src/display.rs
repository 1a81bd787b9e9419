//! Two-line operator display.
//!
//! Purely observational: write failures are logged and dropped, never fed
//! back into control decisions.

use evc_common::hal::driver::TextDisplay;
use tracing::{debug, warn};

use crate::telemetry::ChargeStatus;

pub const MSG_READY: &str = "System Ready";
pub const MSG_PARKING: &str = "Parking...";
pub const MSG_CHARGING: &str = "Charging...";
pub const MSG_LEAVING: &str = "Leaving...";
pub const MSG_DATA_ERROR: &str = "Data Error";

/// Status lines for a telemetry result.
pub fn charge_status_lines(status: &ChargeStatus) -> (String, Option<String>) {
    match (status.battery_percent, status.remaining_minutes) {
        (Some(battery), Some(minutes)) => (
            format!("Batt: {battery:.1}%"),
            Some(format!("Time: {minutes}min")),
        ),
        (Some(battery), None) => (format!("Batt: {battery:.1}%"), None),
        (None, Some(minutes)) => (format!("Time: {minutes}min"), None),
        (None, None) => (MSG_DATA_ERROR.to_string(), None),
    }
}

/// Overwrite-only text sink on top of a [`TextDisplay`].
pub struct DisplayController {
    display: Box<dyn TextDisplay>,
    columns: usize,
}

impl DisplayController {
    pub fn new(display: Box<dyn TextDisplay>, columns: usize) -> Self {
        Self { display, columns }
    }

    /// Replace the screen with `line0` and, if given, `line1`.
    ///
    /// Lines longer than the display are truncated.
    pub fn write(&mut self, line0: &str, line1: Option<&str>) {
        debug!("Display: {:?} / {:?}", line0, line1);
        if let Err(e) = self.display.clear() {
            warn!("Display clear failed: {}", e);
        }
        self.write_row(0, line0);
        if let Some(line1) = line1 {
            self.write_row(1, line1);
        }
    }

    pub fn clear(&mut self) {
        if let Err(e) = self.display.clear() {
            warn!("Display clear failed: {}", e);
        }
    }

    fn write_row(&mut self, row: usize, text: &str) {
        let end = text
            .char_indices()
            .nth(self.columns)
            .map_or(text.len(), |(idx, _)| idx);
        if let Err(e) = self.display.write_row(row, &text[..end]) {
            warn!("Display row {} write failed: {}", row, e);
        }
    }
}
