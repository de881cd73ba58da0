//! EMG Sensor Agent - streaming gesture classification from a single electrode.
//!
//! This library turns a stream of raw sensor readings into stable, debounced
//! classification decisions, and exports labelled feature tables for
//! training the classifier offline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         EMG Sensor Agent                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐   │
//! │  │ Transport │──▶│ Windowing │──▶│ Features  │──▶│  Oracle   │   │
//! │  │ (serial)  │   │ (stride)  │   │ (8 stats) │   │  (model)  │   │
//! │  └───────────┘   └───────────┘   └───────────┘   └───────────┘   │
//! │                                                        │         │
//! │  ┌───────────┐   ┌───────────┐                         ▼         │
//! │  │  Session  │◀──│   Sinks   │◀────────────────── Debouncer      │
//! │  │   Stats   │   │(text/act) │                                   │
//! │  └───────────┘   └───────────┘                                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use emg_sensor_agent::{config::Config, core::{DenseModel, StreamPipeline}, sink::ConsoleSink};
//!
//! let config = Config::default();
//! let model = DenseModel::load(&config.model_path).expect("model artifact");
//! let mut pipeline = StreamPipeline::new(&config.pipeline, model).expect("valid config");
//! let mut console = ConsoleSink::stdout();
//!
//! for (i, line) in ["512", "530", "noise", "498"].iter().enumerate() {
//!     pipeline.ingest_line(line, i as f64 * 0.002, &mut console);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod core;
pub mod sink;
pub mod stats;
pub mod transport;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, PipelineConfig, Profile, SourceConfig, TransportConfig};
pub use crate::core::{
    extract, AucMode, ClassificationOracle, DecisionDebouncer, DecisionEvent, DecisionSink,
    DenseModel, FeatureVector, Prediction, Sample, StepOutcome, StreamPipeline, Window,
    WindowBuffer,
};
pub use sink::{action_channel, ActionReceiver, ActionSink, ConsoleSink, GameAction, SessionRecorder};
pub use stats::{SessionStats, SharedSessionStats};
pub use transport::{LineCollector, LinePoll, RawLine, TransportError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_console() {
        let config = Config::default();
        let console = Config::for_profile(Profile::Console);
        assert_eq!(config.pipeline, console.pipeline);
    }
}
