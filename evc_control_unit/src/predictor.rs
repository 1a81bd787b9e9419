//! Distance → step count prediction.
//!
//! The coil travel for a parked car is a fixed function of the two
//! ultrasonic readings. In production that function is a small pretrained
//! dense network (2→64→32→16→2, ReLU hidden layers) exported to JSON; bench
//! setups can use an affine mapping, and tests inject closures.
//!
//! Every backend is deterministic and side-effect free, and returns
//! non-negative step counts (raw outputs are truncated toward zero, then
//! clamped at zero).

use evc_common::config::{LinearCoefficients, PredictorConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Motor travel for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepPlan {
    pub steps_front: u32,
    pub steps_rear: u32,
}

/// Error loading a predictor.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("failed to read weights {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse weights: {0}")]
    Parse(String),

    #[error("invalid network shape: {0}")]
    Shape(String),
}

/// Pure mapping from two distances to a [`StepPlan`].
pub trait StepPredictor: Send {
    fn predict(&self, front_cm: f64, rear_cm: f64) -> StepPlan;
}

/// Truncate toward zero and clamp at zero. NaN maps to zero.
pub fn to_steps(raw: f64) -> u32 {
    // `as` saturates at u32::MAX and maps NaN to 0.
    raw.trunc().max(0.0) as u32
}

// ─── Dense network ──────────────────────────────────────────────────

/// One fully connected layer; `weights` is `[out][in]`.
#[derive(Debug, Clone, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct WeightsFile {
    layers: Vec<DenseLayer>,
}

/// Feed-forward network with ReLU on every layer but the last.
#[derive(Debug, Clone)]
pub struct MlpPredictor {
    layers: Vec<DenseLayer>,
}

impl MlpPredictor {
    /// Build from layers, checking that shapes chain from 2 inputs to 2 outputs.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self, PredictorError> {
        if layers.is_empty() {
            return Err(PredictorError::Shape("no layers".to_string()));
        }

        let mut width = 2;
        for (idx, layer) in layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.weights.len() != layer.bias.len() {
                return Err(PredictorError::Shape(format!(
                    "layer {idx}: {} weight rows vs {} biases",
                    layer.weights.len(),
                    layer.bias.len()
                )));
            }
            if let Some(row) = layer.weights.iter().position(|r| r.len() != width) {
                return Err(PredictorError::Shape(format!(
                    "layer {idx} row {row}: expected {width} inputs"
                )));
            }
            width = layer.bias.len();
        }
        if width != 2 {
            return Err(PredictorError::Shape(format!(
                "network has {width} outputs, expected 2"
            )));
        }
        Ok(Self { layers })
    }

    /// Load weights exported as `{"layers": [{"weights": [[..]], "bias": [..]}, ..]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, PredictorError> {
        let content = fs::read_to_string(path).map_err(|e| PredictorError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: WeightsFile =
            serde_json::from_str(&content).map_err(|e| PredictorError::Parse(e.to_string()))?;
        Self::from_layers(file.layers)
    }

    /// Layer output widths, input layer excluded.
    pub fn shape(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.bias.len()).collect()
    }

    fn forward(&self, input: [f32; 2]) -> Vec<f32> {
        let last = self.layers.len() - 1;
        let mut activations = input.to_vec();
        for (idx, layer) in self.layers.iter().enumerate() {
            activations = layer
                .weights
                .iter()
                .zip(&layer.bias)
                .map(|(row, bias)| {
                    let sum = row
                        .iter()
                        .zip(&activations)
                        .fold(*bias, |acc, (w, x)| acc + w * x);
                    if idx == last { sum } else { sum.max(0.0) }
                })
                .collect();
        }
        activations
    }
}

impl StepPredictor for MlpPredictor {
    fn predict(&self, front_cm: f64, rear_cm: f64) -> StepPlan {
        let out = self.forward([front_cm as f32, rear_cm as f32]);
        StepPlan {
            steps_front: to_steps(f64::from(out[0])),
            steps_rear: to_steps(f64::from(out[1])),
        }
    }
}

// ─── Affine mapping ─────────────────────────────────────────────────

/// `steps = scale * cm + offset`, per motor.
#[derive(Debug, Clone, Copy)]
pub struct LinearPredictor {
    pub front: LinearCoefficients,
    pub rear: LinearCoefficients,
}

impl StepPredictor for LinearPredictor {
    fn predict(&self, front_cm: f64, rear_cm: f64) -> StepPlan {
        StepPlan {
            steps_front: to_steps(self.front.scale * front_cm + self.front.offset),
            steps_rear: to_steps(self.rear.scale * rear_cm + self.rear.offset),
        }
    }
}

// ─── Closure ────────────────────────────────────────────────────────

/// Wraps a pure closure (test doubles, calibration tables).
pub struct FnPredictor<F>(pub F);

impl<F> StepPredictor for FnPredictor<F>
where
    F: Fn(f64, f64) -> StepPlan + Send,
{
    fn predict(&self, front_cm: f64, rear_cm: f64) -> StepPlan {
        (self.0)(front_cm, rear_cm)
    }
}

/// Build the predictor selected in `[predictor]`.
pub fn build_predictor(config: &PredictorConfig) -> Result<Box<dyn StepPredictor>, PredictorError> {
    match config {
        PredictorConfig::Mlp { weights } => {
            let mlp = MlpPredictor::from_json_file(weights)?;
            info!(
                "Loaded MLP step predictor from {} (layers {:?})",
                weights.display(),
                mlp.shape()
            );
            Ok(Box::new(mlp))
        }
        PredictorConfig::Linear { front, rear } => {
            info!(
                "Using linear step predictor (front {}x+{}, rear {}x+{})",
                front.scale, front.offset, rear.scale, rear.offset
            );
            Ok(Box::new(LinearPredictor {
                front: *front,
                rear: *rear,
            }))
        }
    }
}
