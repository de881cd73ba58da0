//! Classification oracle interface and the dense network artifact.
//!
//! The pipeline only needs a function from a feature vector to a probability
//! distribution over the configured labels. [`DenseModel`] is the concrete
//! implementation used by the CLI: a small feed-forward network whose weights
//! are produced by the offline training step and persisted as JSON.

use crate::core::features::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Allowed deviation of a distribution's sum from 1.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-3;

/// Errors from loading or evaluating a classifier.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("expected {expected} probabilities, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("distribution sums to {0}, not 1")]
    NotNormalized(f64),

    #[error("distribution contains an invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("model artifact is malformed: {0}")]
    MalformedModel(String),

    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("prediction failed: {0}")]
    Predict(String),
}

/// A trained classifier mapping feature vectors to label probabilities.
///
/// The returned vector is indexed in the same order as the configured label
/// set.
pub trait ClassificationOracle {
    /// Number of probabilities returned by [`predict`](Self::predict).
    fn output_dim(&self) -> usize;

    /// Labels the oracle was trained with, if it knows them.
    fn labels(&self) -> Option<&[String]> {
        None
    }

    fn predict(&self, features: &FeatureVector) -> Result<Vec<f64>, OracleError>;
}

impl<O: ClassificationOracle + ?Sized> ClassificationOracle for Box<O> {
    fn output_dim(&self) -> usize {
        (**self).output_dim()
    }

    fn labels(&self) -> Option<&[String]> {
        (**self).labels()
    }

    fn predict(&self, features: &FeatureVector) -> Result<Vec<f64>, OracleError> {
        (**self).predict(features)
    }
}

/// Check that `probs` is a probability distribution of `expected_dim` entries.
pub fn validate_distribution(probs: &[f64], expected_dim: usize) -> Result<(), OracleError> {
    if probs.len() != expected_dim {
        return Err(OracleError::DimensionMismatch {
            expected: expected_dim,
            actual: probs.len(),
        });
    }

    if let Some(&bad) = probs.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(OracleError::InvalidProbability(bad));
    }

    let sum: f64 = probs.iter().sum();
    if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(OracleError::NotNormalized(sum));
    }

    Ok(())
}

/// The most probable label of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Pick the arg-max of a distribution. Ties go to the earliest label.
    ///
    /// Returns `None` if the inputs are empty or of different lengths.
    pub fn from_distribution(labels: &[String], probs: &[f64]) -> Option<Self> {
        if labels.len() != probs.len() {
            return None;
        }

        let (index, &confidence) = probs
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, &f64)>, (i, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((i, p)),
            })?;

        Some(Self::new(labels[index].clone(), confidence))
    }
}

/// Activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

/// One fully connected layer. `weights[i][j]` connects input `i` to output `j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn input_dim(&self) -> usize {
        self.weights.len()
    }

    fn output_dim(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut output = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (out, w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }

        match self.activation {
            Activation::Linear => output,
            Activation::Relu => output.into_iter().map(|v| v.max(0.0)).collect(),
            Activation::Softmax => softmax(&output),
        }
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Feed-forward network loaded from a JSON artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModel {
    /// Class names in output order, when the training step recorded them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    pub layers: Vec<DenseLayer>,
}

impl DenseModel {
    /// Build a model and check that its layer shapes chain together.
    pub fn new(layers: Vec<DenseLayer>, labels: Option<Vec<String>>) -> Result<Self, OracleError> {
        let model = Self { labels, layers };
        model.check_shapes()?;
        Ok(model)
    }

    /// Load a persisted model artifact.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let model: DenseModel = serde_json::from_str(&content)?;
        model.check_shapes()?;

        tracing::info!(
            path = %path.as_ref().display(),
            layers = model.layers.len(),
            outputs = model.output_dim(),
            "loaded model artifact"
        );
        Ok(model)
    }

    fn check_shapes(&self) -> Result<(), OracleError> {
        if self.layers.is_empty() {
            return Err(OracleError::MalformedModel("no layers".to_string()));
        }

        let mut expected_inputs = FEATURE_COUNT;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.input_dim() != expected_inputs {
                return Err(OracleError::MalformedModel(format!(
                    "layer {index} expects {} inputs, previous layer provides {expected_inputs}",
                    layer.input_dim()
                )));
            }
            if layer.output_dim() == 0 {
                return Err(OracleError::MalformedModel(format!(
                    "layer {index} has no outputs"
                )));
            }
            if let Some(row) = layer.weights.iter().find(|r| r.len() != layer.output_dim()) {
                return Err(OracleError::MalformedModel(format!(
                    "layer {index} has a weight row of width {}, expected {}",
                    row.len(),
                    layer.output_dim()
                )));
            }
            expected_inputs = layer.output_dim();
        }

        if let Some(ref labels) = self.labels {
            if labels.len() != expected_inputs {
                return Err(OracleError::MalformedModel(format!(
                    "{} labels for {expected_inputs} outputs",
                    labels.len()
                )));
            }
        }

        Ok(())
    }
}

impl ClassificationOracle for DenseModel {
    fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::output_dim)
    }

    fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    fn predict(&self, features: &FeatureVector) -> Result<Vec<f64>, OracleError> {
        let output = self
            .layers
            .iter()
            .fold(features.to_array().to_vec(), |input, layer| layer.forward(&input));

        if output.iter().any(|v| !v.is_finite()) {
            return Err(OracleError::Predict(
                "network produced a non-finite output".to_string(),
            ));
        }
        Ok(output)
    }
}
