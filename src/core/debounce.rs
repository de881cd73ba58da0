//! Decision debouncing.
//!
//! Raw per-window predictions flicker. The debouncer drops low-confidence
//! predictions and suppresses repeats of the last reported label until a
//! cooldown has elapsed. A change of label is always reported immediately.

use crate::core::oracle::Prediction;
use serde::{Deserialize, Serialize};

/// Thresholds applied by [`DecisionDebouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Predictions must be strictly more confident than this to be reported
    pub confidence_threshold: f64,
    /// Seconds before the same label may be reported again
    pub cooldown_secs: f64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            cooldown_secs: 0.5,
        }
    }
}

/// A reportable classification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub label: String,
    pub confidence: f64,
    /// Stream time of the window that produced the decision
    pub timestamp: f64,
}

/// What the debouncer last reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebounceState {
    pub last_emitted_label: Option<String>,
    pub last_emitted_time: Option<f64>,
}

/// Turns a stream of predictions into sparse decision events.
#[derive(Debug, Clone)]
pub struct DecisionDebouncer {
    config: DebounceConfig,
    state: DebounceState,
}

impl DecisionDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            state: DebounceState::default(),
        }
    }

    /// Feed one prediction observed at stream time `now`.
    pub fn observe(&mut self, prediction: &Prediction, now: f64) -> Option<DecisionEvent> {
        if prediction.confidence <= self.config.confidence_threshold {
            return None;
        }

        let label_changed =
            self.state.last_emitted_label.as_deref() != Some(prediction.label.as_str());
        let cooled_down = self
            .state
            .last_emitted_time
            .map_or(true, |last| now - last > self.config.cooldown_secs);

        if !label_changed && !cooled_down {
            return None;
        }

        self.state.last_emitted_label = Some(prediction.label.clone());
        self.state.last_emitted_time = Some(now);

        Some(DecisionEvent {
            label: prediction.label.clone(),
            confidence: prediction.confidence,
            timestamp: now,
        })
    }

    /// Forget everything reported so far.
    pub fn reset(&mut self) {
        self.state = DebounceState::default();
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }
}
