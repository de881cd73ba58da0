//! Per-sample orchestration of windowing, classification and debouncing.
//!
//! ```text
//! sample ─▶ WindowBuffer ─full?─▶ extract ─▶ oracle ─▶ arg-max ─▶ debouncer ─▶ sink
//!                 ▲                                                   │
//!                 └─────────────────────── slide ◀────────────────────┘
//! ```
//!
//! The pipeline owns the window buffer and the debounce state. Everything it
//! reports goes through a [`DecisionSink`], so console output and action
//! dispatch share one implementation with different configurations.

use crate::config::{ConfigError, PipelineConfig};
use crate::core::debounce::{DecisionDebouncer, DecisionEvent};
use crate::core::features::{extract, AucMode};
use crate::core::oracle::{validate_distribution, ClassificationOracle, OracleError, Prediction};
use crate::core::windowing::{Sample, Window, WindowBuffer};
use crate::stats::{create_shared_stats, SharedSessionStats};
use crate::transport::parse_sample;
use tracing::{debug, warn};

/// Receives decision events from the pipeline.
pub trait DecisionSink {
    fn emit(&mut self, event: &DecisionEvent);
}

impl<F: FnMut(&DecisionEvent)> DecisionSink for F {
    fn emit(&mut self, event: &DecisionEvent) {
        self(event)
    }
}

/// What happened to one incoming sample.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The line was not a sample; nothing changed
    Skipped,
    /// The buffer does not hold a full window yet
    WarmingUp,
    /// A window was classified but the debouncer held the prediction back
    Suppressed(Prediction),
    /// A window was classified and a decision was reported
    Decided(DecisionEvent),
    /// The classifier failed on this window; no decision was made
    OracleFailed,
}

/// Streaming classifier for one sensor stream.
pub struct StreamPipeline<O> {
    buffer: WindowBuffer,
    debouncer: DecisionDebouncer,
    oracle: O,
    labels: Vec<String>,
    auc_mode: AucMode,
    stats: SharedSessionStats,
}

impl<O: ClassificationOracle> StreamPipeline<O> {
    /// Build a pipeline, rejecting configurations that do not match the oracle.
    pub fn new(config: &PipelineConfig, oracle: O) -> Result<Self, ConfigError> {
        config.validate()?;
        config.check_oracle(oracle.output_dim(), oracle.labels())?;

        Ok(Self {
            buffer: WindowBuffer::new(config.window_size, config.overlap_fraction)?,
            debouncer: DecisionDebouncer::new(config.debounce()),
            oracle,
            labels: config.labels.clone(),
            auc_mode: config.auc_mode,
            stats: create_shared_stats(),
        })
    }

    /// Record counters into shared session stats.
    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = stats;
        self
    }

    /// Parse a raw transport line and process it.
    ///
    /// Lines that are not samples are skipped without touching any state.
    pub fn ingest_line<S>(&mut self, text: &str, timestamp: f64, sink: &mut S) -> StepOutcome
    where
        S: DecisionSink + ?Sized,
    {
        match parse_sample(text) {
            Ok(value) => self.ingest(Sample::new(value, timestamp), sink),
            Err(e) => {
                debug!(error = %e, "skipping line");
                self.stats.record_skipped_line();
                StepOutcome::Skipped
            }
        }
    }

    /// Process one sample.
    pub fn ingest<S>(&mut self, sample: Sample, sink: &mut S) -> StepOutcome
    where
        S: DecisionSink + ?Sized,
    {
        self.stats.record_sample();
        self.buffer.push(sample);

        let Some(window) = self.buffer.snapshot() else {
            return StepOutcome::WarmingUp;
        };

        let outcome = match self.classify(&window) {
            Ok(prediction) => {
                self.stats.record_window_classified();
                match self.debouncer.observe(&prediction, sample.timestamp) {
                    Some(event) => {
                        debug!(
                            label = %event.label,
                            confidence = event.confidence,
                            t = event.timestamp,
                            "decision"
                        );
                        sink.emit(&event);
                        self.stats.record_decision();
                        StepOutcome::Decided(event)
                    }
                    None => StepOutcome::Suppressed(prediction),
                }
            }
            Err(e) => {
                warn!(error = %e, t = sample.timestamp, "classification failed, window dropped");
                self.stats.record_oracle_failure();
                StepOutcome::OracleFailed
            }
        };

        self.buffer.slide();
        outcome
    }

    fn classify(&self, window: &Window) -> Result<Prediction, OracleError> {
        let features = extract(window, self.auc_mode);
        let probs = self.oracle.predict(&features)?;
        validate_distribution(&probs, self.labels.len())?;

        Prediction::from_distribution(&self.labels, &probs).ok_or(OracleError::DimensionMismatch {
            expected: self.labels.len(),
            actual: probs.len(),
        })
    }

    /// Discard buffered samples and debounce state, as on a stream restart.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.debouncer.reset();
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    pub fn debouncer(&self) -> &DecisionDebouncer {
        &self.debouncer
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn stats(&self) -> &SharedSessionStats {
        &self.stats
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }
}
