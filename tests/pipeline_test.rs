//! Integration tests for the streaming classification pipeline

use emg_sensor_agent::config::{Config, ConfigError, PipelineConfig, Profile};
use emg_sensor_agent::core::oracle::OracleError;
use emg_sensor_agent::core::{
    Activation, ClassificationOracle, DenseLayer, DenseModel, FeatureVector, StepOutcome,
    StreamPipeline,
};
use emg_sensor_agent::sink::{action_channel, GameAction, SessionRecorder};
use emg_sensor_agent::stats::create_shared_stats;
use emg_sensor_agent::transport::{LineClock, LineCollector, LinePoll};
use emg_sensor_agent::{AucMode, DecisionEvent};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

/// Returns queued distributions in order and remembers what it was asked.
struct ScriptedOracle {
    dim: usize,
    replies: Mutex<VecDeque<Vec<f64>>>,
    seen: Mutex<Vec<FeatureVector>>,
}

impl ScriptedOracle {
    fn new(dim: usize, replies: Vec<Vec<f64>>) -> Self {
        Self {
            dim,
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl ClassificationOracle for ScriptedOracle {
    fn output_dim(&self) -> usize {
        self.dim
    }

    fn predict(&self, features: &FeatureVector) -> Result<Vec<f64>, OracleError> {
        self.seen.lock().unwrap().push(*features);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| OracleError::Predict("script exhausted".to_string()))
    }
}

fn pipeline_config(window_size: usize, labels: &[&str]) -> PipelineConfig {
    PipelineConfig {
        window_size,
        overlap_fraction: 0.0,
        confidence_threshold: 0.7,
        cooldown: Duration::from_millis(500),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        auc_mode: AucMode::Timestamps,
    }
}

#[test]
fn test_four_sample_window_end_to_end() {
    let oracle = ScriptedOracle::new(2, vec![vec![0.9, 0.1]]);
    let mut pipeline = StreamPipeline::new(&pipeline_config(4, &["A", "B"]), oracle).unwrap();
    let mut events = Vec::new();
    let mut sink = |e: &DecisionEvent| events.push(e.clone());

    let mut outcomes = Vec::new();
    for (i, text) in ["1", "2", "3", "4"].iter().enumerate() {
        outcomes.push(pipeline.ingest_line(text, i as f64, &mut sink));
    }

    assert!(outcomes[..3].iter().all(|o| *o == StepOutcome::WarmingUp));
    assert!(matches!(outcomes[3], StepOutcome::Decided(_)));
    assert!(pipeline.buffer().is_empty());

    let seen = pipeline.oracle().seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let f = seen[0];
    assert!((f.auc - 7.5).abs() < 1e-9);
    assert!((f.mean - 2.5).abs() < 1e-9);
    assert!((f.rms - 7.5f64.sqrt()).abs() < 1e-9);
    assert_eq!(f.max, 4.0);
    assert_eq!(f.min, 1.0);
    assert!((f.mean_deriv - 1.0).abs() < 1e-9);
    assert!(f.std_deriv.abs() < 1e-9);
    drop(seen);

    drop(sink);
    assert_eq!(
        events,
        vec![DecisionEvent {
            label: "A".to_string(),
            confidence: 0.9,
            timestamp: 3.0,
        }]
    );
}

#[test]
fn test_debounce_sequence_through_pipeline() {
    let replies = vec![
        vec![0.9, 0.05, 0.05],
        vec![0.9, 0.05, 0.05],
        vec![0.9, 0.05, 0.05],
        vec![0.1, 0.8, 0.1],
        vec![0.25, 0.5, 0.25],
    ];
    let oracle = ScriptedOracle::new(3, replies);
    let mut pipeline = StreamPipeline::new(&pipeline_config(1, &["A", "B", "C"]), oracle).unwrap();
    let mut recorder = SessionRecorder::new("console");

    let times = [0.0, 0.2, 0.6, 0.61, 0.7];
    let decided: Vec<bool> = times
        .iter()
        .map(|&t| {
            matches!(
                pipeline.ingest_line("512", t, &mut recorder),
                StepOutcome::Decided(_)
            )
        })
        .collect();

    assert_eq!(decided, vec![true, false, true, true, false]);

    let labels: Vec<&str> = recorder.events().iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["A", "A", "B"]);
}

#[test]
fn test_replayed_recording() {
    let input = Cursor::new(b"1\n2\nnoise\n\n3\n4\n5\n".to_vec());
    let mut collector = LineCollector::from_reader(input, LineClock::synthetic(1.0), "recording");

    let stats = create_shared_stats();
    let oracle = ScriptedOracle::new(2, vec![vec![0.95, 0.05]]);
    let mut pipeline = StreamPipeline::new(&pipeline_config(4, &["A", "B"]), oracle)
        .unwrap()
        .with_stats(stats.clone());
    let mut events = Vec::new();
    let mut sink = |e: &DecisionEvent| events.push(e.clone());

    loop {
        match collector.recv(Duration::from_secs(1)).unwrap() {
            LinePoll::Line(line) => {
                pipeline.ingest_line(&line.text, line.received_at, &mut sink);
            }
            LinePoll::Idle => continue,
            LinePoll::Ended => break,
        }
    }
    drop(sink);

    // The fourth valid sample arrives on the sixth line.
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp, 5.0);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.samples_received, 5);
    assert_eq!(snapshot.lines_skipped, 2);
    assert_eq!(snapshot.windows_classified, 1);
    assert_eq!(snapshot.decisions_emitted, 1);
    assert_eq!(pipeline.buffer().len(), 1);
}

#[test]
fn test_oracle_failure_does_not_stop_the_stream() {
    let replies = vec![vec![0.6, 0.6], vec![0.1, 0.9]];
    let oracle = ScriptedOracle::new(2, replies);
    let stats = create_shared_stats();
    let mut pipeline = StreamPipeline::new(&pipeline_config(2, &["A", "B"]), oracle)
        .unwrap()
        .with_stats(stats.clone());
    let mut events = Vec::new();
    let mut sink = |e: &DecisionEvent| events.push(e.clone());

    let outcomes: Vec<StepOutcome> = (0..4)
        .map(|i| pipeline.ingest_line("10", i as f64, &mut sink))
        .collect();
    drop(sink);

    assert_eq!(outcomes[1], StepOutcome::OracleFailed);
    assert!(matches!(outcomes[3], StepOutcome::Decided(_)));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].label, "B");
    assert_eq!(stats.snapshot().oracle_failures, 1);
}

#[test]
fn test_label_count_must_match_oracle() {
    let oracle = ScriptedOracle::new(2, Vec::new());
    let result = StreamPipeline::new(&pipeline_config(4, &["A", "B", "C"]), oracle);

    assert!(matches!(
        result,
        Err(ConfigError::LabelCountMismatch {
            labels: 3,
            outputs: 2
        })
    ));
}

#[test]
fn test_game_profile_reports_unbound_action_label() {
    let config = Config::for_profile(Profile::Game);

    match config.validate() {
        Err(ConfigError::UnknownActionLabel { label, labels }) => {
            assert_eq!(label, "wrist");
            assert_eq!(labels, vec!["clench", "index", "rest"]);
        }
        other => panic!("expected UnknownActionLabel, got {other:?}"),
    }
}

#[test]
fn test_dense_model_drives_action_dispatch() {
    // Favour "clench" for large means and "rest" for small ones.
    let mut weights = vec![vec![0.0; 3]; 8];
    weights[1] = vec![0.05, 0.0, -0.05];
    let layer = DenseLayer {
        weights,
        bias: vec![-15.0, 0.0, 15.0],
        activation: Activation::Softmax,
    };
    let labels = vec!["clench".to_string(), "index".to_string(), "rest".to_string()];
    let model = DenseModel::new(vec![layer], Some(labels.clone())).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();
    let model = DenseModel::load(&path).unwrap();

    let mut config = Config::for_profile(Profile::Game);
    config.pipeline.window_size = 10;
    config.actions.remove("wrist");
    config.validate().unwrap();

    let mut pipeline = StreamPipeline::new(&config.pipeline, model).unwrap();
    let (mut actions, receiver) = action_channel(config.actions.clone());

    for i in 0..10 {
        pipeline.ingest_line("600", i as f64 * 0.01, &mut actions);
    }

    let dispatched = receiver.poll().unwrap();
    assert_eq!(dispatched.action, GameAction::Jump);
    assert_eq!(dispatched.event.label, "clench");
    assert!(dispatched.event.confidence > 0.99);

    let outcomes: Vec<StepOutcome> = (10..20)
        .map(|i| pipeline.ingest_line("5", i as f64 * 0.01, &mut actions))
        .collect();
    assert!(matches!(outcomes[4], StepOutcome::Suppressed(_)));
    match &outcomes[9] {
        StepOutcome::Decided(event) => assert_eq!(event.label, "rest"),
        other => panic!("expected a decision, got {other:?}"),
    }
    // "rest" has no binding.
    assert!(receiver.poll().is_none());
}
