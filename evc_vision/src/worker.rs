//! Frame loop publishing detections to the shared state.

use evc_common::config::VisionConfig;
use evc_common::shared_state::{DetectionSnapshot, SharedState, StateKey};
use evc_common::shutdown::ShutdownToken;
use evc_common::time::{Clock, epoch_seconds};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::source::{DetectionSource, Frame};

/// Detector class names mapped to the shared cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    pub car: String,
    pub ev: String,
    pub normal: String,
}

impl LabelMap {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            car: config.car_label.clone(),
            ev: config.ev_label.clone(),
            normal: config.normal_label.clone(),
        }
    }

    /// `(car, ev, normal)` flags for one frame.
    pub fn classify(&self, frame: &Frame) -> (bool, bool, bool) {
        (
            frame.contains(&self.car),
            frame.contains(&self.ev),
            frame.contains(&self.normal),
        )
    }
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisionStats {
    pub frames: u64,
    pub skipped: u64,
}

/// Single writer of the detection cells.
pub struct VisionWorker {
    source: Box<dyn DetectionSource>,
    labels: LabelMap,
    shared: Arc<SharedState>,
    clock: Arc<dyn Clock>,
    token: ShutdownToken,
    frame_interval: Duration,
}

impl VisionWorker {
    pub fn new(
        source: Box<dyn DetectionSource>,
        labels: LabelMap,
        shared: Arc<SharedState>,
        clock: Arc<dyn Clock>,
        token: ShutdownToken,
        frame_interval: Duration,
    ) -> Self {
        Self {
            source,
            labels,
            shared,
            clock,
            token,
            frame_interval,
        }
    }

    /// Publish one frame's detections.
    pub fn publish(&self, frame: &Frame) -> DetectionSnapshot {
        let (car, ev, normal) = self.labels.classify(frame);
        let snapshot = self.shared.publish_frame(car, ev, normal, epoch_seconds());
        debug!(
            "[vision] {}={} {}={} {}={} {}={:.2}",
            StateKey::CarDetected,
            snapshot.car_detected,
            StateKey::EvDetected,
            snapshot.ev_detected,
            StateKey::NormalDetected,
            snapshot.normal_detected,
            StateKey::LastDetectedTime,
            snapshot.last_detected_time
        );
        snapshot
    }

    /// Process frames until the source ends or shutdown is requested.
    ///
    /// Frames that fail to read are skipped.
    pub fn run(&mut self) -> VisionStats {
        info!(
            "Vision worker started (labels: car={:?} ev={:?} normal={:?})",
            self.labels.car, self.labels.ev, self.labels.normal
        );
        let mut stats = VisionStats::default();

        while !self.token.is_tripped() {
            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    self.publish(&frame);
                    stats.frames += 1;
                }
                Ok(None) => {
                    info!("Detection source ended");
                    break;
                }
                Err(e) => {
                    warn!("Skipping frame: {}", e);
                    stats.skipped += 1;
                }
            }
            if !self.token.sleep(self.clock.as_ref(), self.frame_interval) {
                break;
            }
        }

        info!(
            "Vision worker stopped after {} frames ({} skipped)",
            stats.frames, stats.skipped
        );
        stats
    }
}
