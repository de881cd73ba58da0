//! EMG Sensor Agent CLI
//!
//! Streams sensor readings through the gesture classifier and exports
//! training features.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use emg_sensor_agent::{
    batch,
    config::{Config, Profile, SourceConfig},
    core::{DecisionSink, DenseModel, StreamPipeline},
    sink::{action_channel, ConsoleSink, FanoutSink, SessionRecorder},
    stats::{create_shared_stats_with_persistence, PersistedStats},
    transport::{LineCollector, LinePoll, TransportError},
    AucMode, ClassificationOracle, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

/// How long the main loop waits for a line before checking for Ctrl+C.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// File name of the persisted session counters.
const STATS_FILE: &str = "session_stats.json";

#[derive(Parser)]
#[command(name = "emg-sensor")]
#[command(version = VERSION)]
#[command(about = "Streaming EMG gesture classification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a live or recorded sensor stream
    Run {
        /// Configuration profile (console or game)
        #[arg(long, default_value = "console", value_parser = parse_profile)]
        profile: Profile,

        /// Serial device to read from
        #[arg(long, conflicts_with_all = ["stdin", "replay"])]
        port: Option<String>,

        /// Read samples from standard input
        #[arg(long)]
        stdin: bool,

        /// Replay a recorded file of sensor lines
        #[arg(long, conflicts_with = "stdin")]
        replay: Option<PathBuf>,

        /// Model artifact to load
        #[arg(long)]
        model: Option<PathBuf>,

        /// Samples per window
        #[arg(long)]
        window_size: Option<usize>,

        /// Fraction of each window shared with the next
        #[arg(long)]
        overlap: Option<f64>,

        /// Minimum confidence for a decision
        #[arg(long)]
        threshold: Option<f64>,

        /// Seconds before the same label is reported again
        #[arg(long)]
        cooldown: Option<f64>,

        /// Integrate the AUC feature with unit sample spacing
        #[arg(long)]
        uniform_auc: bool,

        /// Fail if the sensor is silent for this many seconds
        #[arg(long)]
        read_timeout: Option<f64>,

        /// Do not write the session's decisions to the export directory
        #[arg(long)]
        no_export: bool,
    },

    /// Export a feature table from recorded trials
    Extract {
        /// Directory of data_<label>_<timestamp>.csv recordings
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Output CSV file
        #[arg(long, short, default_value = "features.csv")]
        output: PathBuf,
    },

    /// Check a profile's configuration against its model
    Validate {
        #[arg(long, default_value = "console", value_parser = parse_profile)]
        profile: Profile,

        /// Model artifact to check against
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Show cumulative statistics
    Status,

    /// Show configuration
    Config {
        #[arg(long, default_value = "console", value_parser = parse_profile)]
        profile: Profile,

        /// Write the shown configuration to the profile's config file
        #[arg(long)]
        init: bool,
    },
}

fn parse_profile(s: &str) -> Result<Profile, String> {
    Profile::from_name(s).ok_or_else(|| format!("unknown profile '{s}' (expected console or game)"))
}

/// Per-run overrides of the loaded configuration.
struct RunOverrides {
    port: Option<String>,
    stdin: bool,
    replay: Option<PathBuf>,
    model: Option<PathBuf>,
    window_size: Option<usize>,
    overlap: Option<f64>,
    threshold: Option<f64>,
    cooldown: Option<f64>,
    uniform_auc: bool,
    read_timeout: Option<f64>,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(port) = self.port {
            config.transport.source = SourceConfig::Serial { port };
        }
        if self.stdin {
            config.transport.source = SourceConfig::Stdin;
        }
        if let Some(path) = self.replay {
            config.transport.source = SourceConfig::Replay { path };
        }
        if let Some(model) = self.model {
            config.model_path = model;
        }
        if let Some(window_size) = self.window_size {
            config.pipeline.window_size = window_size;
        }
        if let Some(overlap) = self.overlap {
            config.pipeline.overlap_fraction = overlap;
        }
        if let Some(threshold) = self.threshold {
            config.pipeline.confidence_threshold = threshold;
        }
        if let Some(cooldown) = self.cooldown {
            config.pipeline.cooldown =
                Duration::try_from_secs_f64(cooldown).context("invalid --cooldown")?;
        }
        if self.uniform_auc {
            config.pipeline.auc_mode = AucMode::UniformSpacing;
        }
        if let Some(timeout) = self.read_timeout {
            config.transport.read_timeout =
                Some(Duration::try_from_secs_f64(timeout).context("invalid --read-timeout")?);
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            profile,
            port,
            stdin,
            replay,
            model,
            window_size,
            overlap,
            threshold,
            cooldown,
            uniform_auc,
            read_timeout,
            no_export,
        } => {
            let overrides = RunOverrides {
                port,
                stdin,
                replay,
                model,
                window_size,
                overlap,
                threshold,
                cooldown,
                uniform_auc,
                read_timeout,
            };
            cmd_run(profile, overrides, !no_export)
        }
        Commands::Extract { data_dir, output } => cmd_extract(&data_dir, &output),
        Commands::Validate { profile, model } => cmd_validate(profile, model),
        Commands::Status => cmd_status(),
        Commands::Config { profile, init } => cmd_config(profile, init),
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emg_sensor_agent=info,emg_sensor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load a profile and check it, with CLI overrides applied.
fn load_checked_config(profile: Profile, overrides: RunOverrides) -> anyhow::Result<Config> {
    let mut config = Config::load(profile)
        .with_context(|| format!("loading {}", Config::config_path(profile).display()))?;
    overrides.apply(&mut config)?;
    config
        .validate()
        .with_context(|| format!("invalid {} configuration", profile.name()))?;
    Ok(config)
}

fn load_model(config: &Config) -> anyhow::Result<DenseModel> {
    DenseModel::load(&config.model_path)
        .with_context(|| format!("loading model {}", config.model_path.display()))
}

fn cmd_run(profile: Profile, overrides: RunOverrides, export: bool) -> anyhow::Result<()> {
    println!("EMG Sensor Agent v{VERSION}");
    println!();

    let config = load_checked_config(profile, overrides)?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let model = load_model(&config)?;
    let stats = create_shared_stats_with_persistence(config.data_path.join(STATS_FILE));
    let mut pipeline = StreamPipeline::new(&config.pipeline, model)
        .context("configuration does not match the model")?
        .with_stats(stats.clone());

    let buffer = pipeline.buffer();
    println!("Starting real-time classification ({} profile)", profile.name());
    println!("  Source: {}", config.transport.source.describe());
    println!(
        "  Window: {} samples, stride {}",
        buffer.capacity(),
        buffer.stride()
    );
    println!(
        "  Threshold: {:.2}, cooldown: {:.2}s",
        config.pipeline.confidence_threshold,
        config.pipeline.cooldown.as_secs_f64()
    );
    println!("  Labels: {}", pipeline.labels().join(", "));
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut collector = LineCollector::open(&config.transport)
        .with_context(|| format!("opening {}", config.transport.source.describe()))?;

    let mut recorder = SessionRecorder::new(profile.name());
    let result = match profile {
        Profile::Console => {
            let mut console = ConsoleSink::stdout();
            let mut sink = FanoutSink::new().with(&mut console).with(&mut recorder);
            stream(&mut collector, &mut pipeline, &mut sink, &running)
        }
        Profile::Game => {
            let (mut actions, receiver) = action_channel(config.actions.clone());
            let consumer_running = running.clone();
            let consumer = thread::spawn(move || {
                while consumer_running.load(Ordering::SeqCst) {
                    if let Some(dispatched) = receiver.wait(POLL_INTERVAL) {
                        println!(
                            "Action: {:?} ({} {:.2})",
                            dispatched.action, dispatched.event.label, dispatched.event.confidence
                        );
                    }
                }
            });

            let mut sink = FanoutSink::new().with(&mut actions).with(&mut recorder);
            let result = stream(&mut collector, &mut pipeline, &mut sink, &running);
            running.store(false, Ordering::SeqCst);
            let _ = consumer.join();
            result
        }
    };

    println!();
    println!("Exiting real-time classification...");
    collector.stop();
    // In-flight samples never reach the classifier.
    pipeline.reset();

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    if export {
        match recorder.export(&config.export_path) {
            Ok(Some(path)) => println!(
                "Exported {} decisions to {:?}",
                recorder.events().len(),
                path
            ),
            Ok(None) => {}
            Err(e) => eprintln!("Error writing session export: {e}"),
        }
    }

    println!();
    println!("{}", stats.summary());

    result.context("sensor stream failed")
}

/// Pull lines until the source ends, Ctrl+C is pressed, or the transport fails.
fn stream<O, S>(
    collector: &mut LineCollector,
    pipeline: &mut StreamPipeline<O>,
    sink: &mut S,
    running: &AtomicBool,
) -> Result<(), TransportError>
where
    O: ClassificationOracle,
    S: DecisionSink + ?Sized,
{
    while running.load(Ordering::SeqCst) {
        match collector.recv(POLL_INTERVAL)? {
            LinePoll::Line(line) => {
                pipeline.ingest_line(&line.text, line.received_at, sink);
            }
            LinePoll::Idle => {}
            LinePoll::Ended => {
                info!(source = collector.target(), "end of input");
                break;
            }
        }
    }
    Ok(())
}

fn cmd_extract(data_dir: &std::path::Path, output: &std::path::Path) -> anyhow::Result<()> {
    let summary = batch::export_features(data_dir, output)
        .with_context(|| format!("exporting features from {}", data_dir.display()))?;

    for skipped in &summary.skipped {
        eprintln!("Skipped {:?}: {}", skipped.path, skipped.reason);
    }
    println!(
        "Features for {} recording(s) saved to {}",
        summary.rows.len(),
        output.display()
    );
    Ok(())
}

fn cmd_validate(profile: Profile, model: Option<PathBuf>) -> anyhow::Result<()> {
    let overrides = RunOverrides {
        port: None,
        stdin: false,
        replay: None,
        model,
        window_size: None,
        overlap: None,
        threshold: None,
        cooldown: None,
        uniform_auc: false,
        read_timeout: None,
    };
    let config = load_checked_config(profile, overrides)?;
    let model = load_model(&config)?;

    config
        .pipeline
        .check_oracle(model.output_dim(), model.labels())
        .context("configuration does not match the model")?;

    println!(
        "Profile '{}' is valid: {} labels, model {}",
        profile.name(),
        config.pipeline.labels.len(),
        config.model_path.display()
    );
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load(Profile::Console).unwrap_or_default();

    println!("EMG Sensor Agent Status");
    println!("=======================");
    println!();

    let stats_path = config.data_path.join(STATS_FILE);
    if !stats_path.exists() {
        println!("No previous session data found.");
        return Ok(());
    }

    let stats = PersistedStats::read(&stats_path)
        .with_context(|| format!("reading {}", stats_path.display()))?;
    println!("Cumulative Statistics:");
    println!("  Samples received: {}", stats.samples_received);
    println!("  Lines skipped: {}", stats.lines_skipped);
    println!("  Windows classified: {}", stats.windows_classified);
    println!("  Classifier failures: {}", stats.oracle_failures);
    println!("  Decisions emitted: {}", stats.decisions_emitted);
    println!("  Last updated: {}", stats.last_updated.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

fn cmd_config(profile: Profile, init: bool) -> anyhow::Result<()> {
    let config = Config::load(profile)?;

    println!("Configuration ({})", profile.name());
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path(profile));
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if let Err(e) = config.validate() {
        println!();
        println!("Warning: {e}");
    }

    if init {
        if Config::config_path(profile).exists() {
            bail!("config file already exists; edit it instead");
        }
        config.save(profile)?;
        println!();
        println!("Saved to {:?}", Config::config_path(profile));
    }
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
