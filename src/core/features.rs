//! Feature computation from sample windows.
//!
//! Every window is summarised by the same eight statistics, in a fixed order
//! that is shared by the streaming classifier and the batch feature table.

use crate::core::windowing::Window;
use serde::{Deserialize, Serialize};

/// Column names of a feature vector, in order.
pub const FEATURE_NAMES: [&str; 8] = [
    "auc",
    "mean",
    "std",
    "rms",
    "max",
    "min",
    "mean_deriv",
    "std_deriv",
];

/// Dimensionality of a feature vector.
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Numeric summary of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Area under the value curve (trapezoidal rule)
    pub auc: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Root mean square
    pub rms: f64,
    pub max: f64,
    pub min: f64,
    /// Mean of the first differences
    pub mean_deriv: f64,
    /// Population standard deviation of the first differences
    pub std_deriv: f64,
}

impl FeatureVector {
    /// Features in column order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.auc,
            self.mean,
            self.std,
            self.rms,
            self.max,
            self.min,
            self.mean_deriv,
            self.std_deriv,
        ]
    }
}

/// How the area under the curve is integrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AucMode {
    /// Integrate against sample timestamps
    #[default]
    Timestamps,
    /// Integrate with unit spacing between samples
    UniformSpacing,
}

/// Compute the feature vector of a window.
pub fn extract(window: &Window, mode: AucMode) -> FeatureVector {
    let values = window.values();
    match mode {
        AucMode::Timestamps => extract_series(&values, Some(&window.timestamps())),
        AucMode::UniformSpacing => extract_series(&values, None),
    }
}

/// Compute features from a bare value series.
///
/// With `timestamps`, the AUC is integrated against them; without, unit
/// spacing is used. `timestamps` must be as long as `values`.
pub fn extract_series(values: &[f64], timestamps: Option<&[f64]>) -> FeatureVector {
    if values.is_empty() {
        return FeatureVector::default();
    }

    let auc = match timestamps {
        Some(ts) => {
            debug_assert_eq!(ts.len(), values.len());
            trapezoid(values, ts)
        }
        None => trapezoid_uniform(values),
    };

    let derivative: Vec<f64> = values.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);

    FeatureVector {
        auc,
        mean: bounded_mean(values, min, max),
        std: population_std(values),
        rms: rms(values),
        max,
        min,
        mean_deriv: mean(&derivative),
        std_deriv: population_std(&derivative),
    }
}

/// Trapezoidal integral of `values` sampled at `timestamps`.
fn trapezoid(values: &[f64], timestamps: &[f64]) -> f64 {
    values
        .windows(2)
        .zip(timestamps.windows(2))
        .fold(0.0, |acc, (v, t)| acc + (t[1] - t[0]) * (v[0] + v[1]) / 2.0)
}

/// Trapezoidal integral with unit spacing.
fn trapezoid_uniform(values: &[f64]) -> f64 {
    values
        .windows(2)
        .fold(0.0, |acc, v| acc + (v[0] + v[1]) / 2.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean held within `[min, max]`; summation rounding can push the mean of a
/// flat series past its extremes.
fn bounded_mean(values: &[f64], min: f64, max: f64) -> f64 {
    let mean = mean(values);
    if min <= max {
        mean.clamp(min, max)
    } else {
        mean
    }
}

/// Standard deviation dividing by N.
fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn rms(values: &[f64]) -> f64 {
    let mean_square = values.iter().map(|&v| v * v).sum::<f64>() / values.len() as f64;
    mean_square.sqrt()
}
