//! Configuration for the EMG sensor agent.
//!
//! Two profiles ship with the agent. `console` reports decisions as text and
//! `game` dispatches discrete actions. They use different windows, thresholds
//! and label sets, and each can be overridden by a JSON file in the user's
//! config directory.

use crate::core::debounce::DebounceConfig;
use crate::core::features::AucMode;
use crate::core::windowing::WindowError;
use crate::sink::GameAction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "emg-sensor-agent";

/// Shipped configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// Print each decision to the console
    Console,
    /// Dispatch jump/duck actions
    Game,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Console => "console",
            Profile::Game => "game",
        }
    }

    /// Parse a profile name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "console" => Some(Profile::Console),
            "game" => Some(Profile::Game),
            _ => None,
        }
    }
}

/// Main configuration for the sensor agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Windowing, classification and debounce settings
    pub pipeline: PipelineConfig,

    /// Where raw samples come from
    pub transport: TransportConfig,

    /// Persisted classifier artifact
    pub model_path: PathBuf,

    /// Label to action bindings (game profile)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub actions: BTreeMap<String, GameAction>,

    /// Path for exporting session decision logs
    pub export_path: PathBuf,

    /// Path for storing session statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile(Profile::Console)
    }
}

impl Config {
    /// Built-in settings for a profile.
    pub fn for_profile(profile: Profile) -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        let (pipeline, actions) = match profile {
            Profile::Console => (
                PipelineConfig {
                    window_size: 100,
                    overlap_fraction: 0.0,
                    confidence_threshold: 0.7,
                    cooldown: Duration::from_millis(500),
                    labels: labels(&["clench", "index", "rest", "wrist"]),
                    auc_mode: AucMode::Timestamps,
                },
                BTreeMap::new(),
            ),
            Profile::Game => (
                PipelineConfig {
                    window_size: 200,
                    overlap_fraction: 0.5,
                    confidence_threshold: 0.6,
                    cooldown: Duration::ZERO,
                    labels: labels(&["clench", "index", "rest"]),
                    auc_mode: AucMode::Timestamps,
                },
                // "wrist" is not in this profile's label set. It is kept so that
                // validation reports it instead of the binding silently never firing.
                BTreeMap::from([
                    ("clench".to_string(), GameAction::Jump),
                    ("wrist".to_string(), GameAction::Duck),
                ]),
            ),
        };

        Self {
            pipeline,
            transport: TransportConfig::default(),
            model_path: data_dir.join("emg_classifier.json"),
            actions,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }

    /// Load a profile's configuration, falling back to the built-in settings.
    pub fn load(profile: Profile) -> Result<Self, ConfigError> {
        let config_path = Self::config_path(profile);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::for_profile(profile))
        }
    }

    /// Save configuration to the profile's default location.
    pub fn save(&self, profile: Profile) -> Result<(), ConfigError> {
        let config_path = Self::config_path(profile);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to a profile's configuration file.
    pub fn config_path(profile: Profile) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(format!("{}.json", profile.name()))
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Check everything that can be checked before a model is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.transport.validate()?;

        if let Some(label) = self
            .actions
            .keys()
            .find(|label| !self.pipeline.labels.contains(label))
        {
            return Err(ConfigError::UnknownActionLabel {
                label: label.clone(),
                labels: self.pipeline.labels.clone(),
            });
        }

        Ok(())
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Settings of the streaming classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Samples per window
    pub window_size: usize,

    /// Fraction of each window shared with the next, in [0, 1)
    pub overlap_fraction: f64,

    /// Minimum (exclusive) confidence for a decision, in (0, 1]
    pub confidence_threshold: f64,

    /// Time before the same label is reported again
    #[serde(with = "duration_serde")]
    pub cooldown: Duration,

    /// Class names in the classifier's output order
    pub labels: Vec<String>,

    /// How the AUC feature is integrated
    #[serde(default)]
    pub auc_mode: AucMode,
}

impl PipelineConfig {
    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            confidence_threshold: self.confidence_threshold,
            cooldown_secs: self.cooldown.as_secs_f64(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(WindowError::ZeroWindowSize.into());
        }
        if !(0.0..1.0).contains(&self.overlap_fraction) {
            return Err(WindowError::InvalidOverlap(self.overlap_fraction).into());
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.confidence_threshold));
        }
        if self.labels.is_empty() {
            return Err(ConfigError::EmptyLabelSet);
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.trim().is_empty() {
                return Err(ConfigError::BlankLabel);
            }
            if !seen.insert(label.as_str()) {
                return Err(ConfigError::DuplicateLabel(label.clone()));
            }
        }

        Ok(())
    }

    /// Check the label set against what a loaded classifier produces.
    pub fn check_oracle(
        &self,
        output_dim: usize,
        trained_labels: Option<&[String]>,
    ) -> Result<(), ConfigError> {
        if self.labels.len() != output_dim {
            return Err(ConfigError::LabelCountMismatch {
                labels: self.labels.len(),
                outputs: output_dim,
            });
        }

        if let Some(trained) = trained_labels {
            if trained != self.labels.as_slice() {
                return Err(ConfigError::LabelSetMismatch {
                    configured: self.labels.clone(),
                    trained: trained.to_vec(),
                });
            }
        }

        Ok(())
    }
}

/// Settings of the sensor line transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub source: SourceConfig,

    /// Line rate of the serial device; recorded for the operator only
    pub baud_rate: u32,

    /// Wait after opening the source before the first read
    #[serde(with = "duration_serde")]
    pub settle_delay: Duration,

    /// Fail the stream if no line arrives for this long
    #[serde(default, with = "option_duration_serde")]
    pub read_timeout: Option<Duration>,

    /// Nominal sample rate used to timestamp replayed recordings
    pub replay_rate_hz: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            baud_rate: 9600,
            settle_delay: Duration::from_millis(500),
            read_timeout: None,
            replay_rate_hz: 500.0,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.replay_rate_hz.is_finite() && self.replay_rate_hz > 0.0) {
            return Err(ConfigError::InvalidReplayRate(self.replay_rate_hz));
        }
        Ok(())
    }
}

/// Where raw sensor lines are read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A serial device, e.g. `/dev/ttyACM0` or `COM4`
    Serial { port: String },
    /// Standard input
    Stdin,
    /// A recorded file of sensor lines
    Replay { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM4" } else { "/dev/ttyACM0" };
        SourceConfig::Serial {
            port: port.to_string(),
        }
    }
}

impl SourceConfig {
    /// Human-readable identifier of the source.
    pub fn describe(&self) -> String {
        match self {
            SourceConfig::Serial { port } => format!("serial {port}"),
            SourceConfig::Stdin => "stdin".to_string(),
            SourceConfig::Replay { path } => format!("replay {}", path.display()),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("confidence threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("label set is empty")]
    EmptyLabelSet,

    #[error("label set contains a blank label")]
    BlankLabel,

    #[error("label '{0}' appears more than once")]
    DuplicateLabel(String),

    #[error("{labels} labels configured but the classifier produces {outputs} outputs")]
    LabelCountMismatch { labels: usize, outputs: usize },

    #[error("configured labels {configured:?} differ from the classifier's {trained:?}")]
    LabelSetMismatch {
        configured: Vec<String>,
        trained: Vec<String>,
    },

    #[error("action bound to label '{label}', which is not in the label set {labels:?}")]
    UnknownActionLabel { label: String, labels: Vec<String> },

    #[error("replay rate must be a positive number of Hz, got {0}")]
    InvalidReplayRate(f64),
}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

/// Serde support for an optional Duration as fractional seconds.
mod option_duration_serde {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(de::Error::custom))
            .transpose()
    }
}
