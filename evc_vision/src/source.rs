//! Detection sources.

use evc_common::config::{DetectionStep, VisionConfig, VisionSourceKind};
use evc_common::time::Clock;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use crate::error::VisionError;

/// Class labels found in one camera frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Frame {
    pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Per-frame producer of class labels.
pub trait DetectionSource: Send {
    /// Next frame; `Ok(None)` at end of stream.
    ///
    /// An `Err` covers this frame only; the caller may ask again.
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError>;
}

/// Replays `[[vision.script]]`: each step's labels hold from its `at_s`
/// offset until the next step starts. Never ends.
pub struct ScriptedSource {
    steps: Vec<DetectionStep>,
    clock: Arc<dyn Clock>,
    origin: Duration,
}

impl ScriptedSource {
    /// Offsets count from construction time.
    pub fn new(steps: Vec<DetectionStep>, clock: Arc<dyn Clock>) -> Self {
        let origin = clock.now();
        Self {
            steps,
            clock,
            origin,
        }
    }
}

impl DetectionSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let at = self.clock.now().saturating_sub(self.origin).as_secs_f64();
        let labels = self
            .steps
            .iter()
            .take_while(|step| step.at_s <= at)
            .last()
            .map(|step| step.labels.clone())
            .unwrap_or_default();
        Ok(Some(Frame { labels }))
    }
}

/// One JSON object per line, as printed by an external detector process:
///
/// ```text
/// {"labels": ["Car", "EV license plate"]}
/// ```
///
/// Blank lines are ignored.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead + Send> DetectionSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| VisionError::Decode(e.to_string()));
        }
    }
}

/// Source selected by `[vision] source`.
pub fn build_source(config: &VisionConfig, clock: Arc<dyn Clock>) -> Box<dyn DetectionSource> {
    match config.source {
        VisionSourceKind::Script => Box::new(ScriptedSource::new(config.script.clone(), clock)),
        VisionSourceKind::Stdin => Box::new(JsonLinesSource::new(BufReader::new(std::io::stdin()))),
    }
}
