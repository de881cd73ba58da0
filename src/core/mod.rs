//! Core functionality for the EMG sensor agent.
//!
//! This module contains:
//! - Window management for collecting samples into overlapping windows
//! - Feature computation from sample windows
//! - The classification oracle interface
//! - Decision debouncing and the per-sample pipeline

pub mod debounce;
pub mod features;
pub mod oracle;
pub mod pipeline;
pub mod windowing;

// Re-export commonly used types
pub use debounce::{DebounceConfig, DebounceState, DecisionDebouncer, DecisionEvent};
pub use features::{extract, extract_series, AucMode, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use oracle::{
    validate_distribution, Activation, ClassificationOracle, DenseLayer, DenseModel, OracleError,
    Prediction,
};
pub use pipeline::{DecisionSink, StepOutcome, StreamPipeline};
pub use windowing::{stride_for, Sample, Window, WindowBuffer, WindowError};
