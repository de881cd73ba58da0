//! Window management for collecting samples into fixed-size windows.
//!
//! Samples are pushed one at a time into a bounded buffer. Once the buffer
//! holds `window_size` samples, a snapshot is taken for feature extraction and
//! the buffer slides forward by `stride` samples, so consecutive windows share
//! `window_size - stride` samples.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// A single sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Raw sensor value
    pub value: f64,
    /// Arrival time in seconds on a monotonic clock
    pub timestamp: f64,
}

impl Sample {
    pub fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }
}

/// An immutable, time-ordered run of samples handed to feature extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    samples: Vec<Sample>,
}

impl Window {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Sample values in order.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Sample timestamps in order.
    pub fn timestamps(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time covered by the window in seconds.
    pub fn duration_secs(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}

/// Errors raised when a buffer is constructed with unusable parameters.
#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("window size must be at least 1")]
    ZeroWindowSize,
    #[error("overlap fraction must be in [0, 1), got {0}")]
    InvalidOverlap(f64),
}

/// Number of samples evicted between consecutive windows.
///
/// `round(window_size * (1 - overlap_fraction))`, never less than 1.
pub fn stride_for(window_size: usize, overlap_fraction: f64) -> usize {
    let stride = (window_size as f64 * (1.0 - overlap_fraction)).round() as usize;
    stride.clamp(1, window_size.max(1))
}

/// Bounded ring of samples with a configurable stride.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    /// Number of samples in a full window
    window_size: usize,
    /// Samples removed by each slide
    stride: usize,
    samples: VecDeque<Sample>,
}

impl WindowBuffer {
    /// Create a buffer for windows of `window_size` samples overlapping by
    /// `overlap_fraction`.
    pub fn new(window_size: usize, overlap_fraction: f64) -> Result<Self, WindowError> {
        if window_size == 0 {
            return Err(WindowError::ZeroWindowSize);
        }
        if !(0.0..1.0).contains(&overlap_fraction) {
            return Err(WindowError::InvalidOverlap(overlap_fraction));
        }

        Ok(Self {
            window_size,
            stride: stride_for(window_size, overlap_fraction),
            samples: VecDeque::with_capacity(window_size),
        })
    }

    /// Append a sample, evicting the oldest one if the buffer is over capacity.
    pub fn push(&mut self, sample: Sample) {
        debug_assert!(
            self.samples
                .back()
                .map_or(true, |last| last.timestamp <= sample.timestamp),
            "samples must arrive in non-decreasing timestamp order"
        );

        self.samples.push_back(sample);
        if self.samples.len() > self.window_size {
            self.samples.pop_front();
        }
    }

    /// Check if the buffer holds a complete window.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.window_size
    }

    /// Copy of the current window, or `None` while still warming up.
    pub fn snapshot(&self) -> Option<Window> {
        if !self.is_full() {
            return None;
        }
        Some(Window::new(self.samples.iter().copied().collect()))
    }

    /// Drop the `stride` oldest samples after a window has been consumed.
    ///
    /// Returns the number of samples actually removed.
    pub fn slide(&mut self) -> usize {
        let removed = self.stride.min(self.samples.len());
        self.samples.drain(..removed);
        removed
    }

    /// Discard all buffered samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}
