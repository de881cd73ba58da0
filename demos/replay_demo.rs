//! Demonstration of the EMG Sensor Agent streaming pipeline.
//!
//! This example shows how to:
//! 1. Build a small classifier in code
//! 2. Replay sensor lines through a collector with a synthetic clock
//! 3. Debounce predictions into decisions
//! 4. Fan decisions out to the console and a session recorder
//!
//! Run with: cargo run --example replay_demo

use std::io::Cursor;
use std::time::Duration;

use emg_sensor_agent::{
    config::Config,
    core::{Activation, DenseLayer, DenseModel, StreamPipeline, FEATURE_COUNT},
    sink::{ConsoleSink, FanoutSink, SessionRecorder},
    stats::create_shared_stats,
    transport::{LineClock, LineCollector, LinePoll},
};

/// Sensor output of a short session: a clench, some noise, then rest.
fn synthetic_recording() -> String {
    let mut lines = Vec::new();
    for i in 0..300 {
        lines.push((600 + (i % 7) * 3).to_string());
    }
    lines.push("ÿ garbage".to_string());
    lines.push(String::new());
    for i in 0..300 {
        lines.push((8 + i % 5).to_string());
    }
    lines.join("\n")
}

/// One softmax layer that looks only at the window mean.
fn demo_model(labels: &[String]) -> Result<DenseModel, Box<dyn std::error::Error>> {
    let mut weights = vec![vec![0.0; labels.len()]; FEATURE_COUNT];
    let mut bias = vec![0.0; labels.len()];

    for (j, label) in labels.iter().enumerate() {
        match label.as_str() {
            "clench" => {
                weights[1][j] = 0.05;
                bias[j] = -15.0;
            }
            "rest" => {
                weights[1][j] = -0.05;
                bias[j] = 15.0;
            }
            _ => {}
        }
    }

    let layer = DenseLayer {
        weights,
        bias,
        activation: Activation::Softmax,
    };
    Ok(DenseModel::new(vec![layer], Some(labels.to_vec()))?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("EMG Sensor Agent - Replay Demo");
    println!("==============================");
    println!();

    let config = Config::default();
    let model = demo_model(&config.pipeline.labels)?;

    let stats = create_shared_stats();
    let mut pipeline = StreamPipeline::new(&config.pipeline, model)?.with_stats(stats.clone());

    println!(
        "Window: {} samples, stride {}, threshold {:.2}, cooldown {:.2}s",
        pipeline.buffer().capacity(),
        pipeline.buffer().stride(),
        config.pipeline.confidence_threshold,
        config.pipeline.cooldown.as_secs_f64()
    );
    println!("Replaying at {} Hz", config.transport.replay_rate_hz);
    println!();

    let input = Cursor::new(synthetic_recording().into_bytes());
    let mut collector = LineCollector::from_reader(
        input,
        LineClock::synthetic(config.transport.replay_rate_hz),
        "synthetic recording",
    );

    let mut console = ConsoleSink::stdout();
    let mut recorder = SessionRecorder::new("demo");
    {
        let mut sink = FanoutSink::new().with(&mut console).with(&mut recorder);
        loop {
            match collector.recv(Duration::from_millis(100))? {
                LinePoll::Line(line) => {
                    pipeline.ingest_line(&line.text, line.received_at, &mut sink);
                }
                LinePoll::Idle => continue,
                LinePoll::Ended => break,
            }
        }
    }

    println!();
    println!("Decisions:");
    for event in recorder.events() {
        println!(
            "  t={:.3}s  {:<8} {:.3}",
            event.timestamp, event.label, event.confidence
        );
    }

    println!();
    println!("{}", stats.summary());

    Ok(())
}
