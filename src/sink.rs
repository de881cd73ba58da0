//! Consumers of decision events.
//!
//! The pipeline hands every decision to a [`DecisionSink`]. This module
//! provides the sinks used by the CLI: console text, discrete action dispatch,
//! and a recorder that exports the session's decisions.

use crate::core::debounce::DecisionEvent;
use crate::core::pipeline::DecisionSink;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Prints each decision as a line of text.
pub struct ConsoleSink<W: Write> {
    writer: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DecisionSink for ConsoleSink<W> {
    fn emit(&mut self, event: &DecisionEvent) {
        let result = writeln!(
            self.writer,
            "Predicted movement: {} (Confidence: {:.2})",
            event.label, event.confidence
        )
        .and_then(|_| self.writer.flush());

        if let Err(e) = result {
            tracing::warn!("could not write decision: {e}");
        }
    }
}

/// Discrete actions a decision can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameAction {
    Jump,
    Duck,
}

/// An action together with the decision that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedAction {
    pub action: GameAction,
    pub event: DecisionEvent,
}

/// Create a dispatcher and the receiving end for its consumer.
///
/// At most one action is pending at a time. If the consumer has not taken the
/// previous action when a new one arrives, the new one replaces it.
pub fn action_channel(bindings: BTreeMap<String, GameAction>) -> (ActionSink, ActionReceiver) {
    let (sender, receiver) = bounded(1);
    (
        ActionSink {
            bindings,
            sender,
            stale: receiver.clone(),
        },
        ActionReceiver { receiver },
    )
}

/// Maps decision labels to actions and hands them to a consumer.
pub struct ActionSink {
    bindings: BTreeMap<String, GameAction>,
    sender: Sender<DispatchedAction>,
    /// Used to drop an action the consumer has not picked up yet
    stale: Receiver<DispatchedAction>,
}

impl ActionSink {
    pub fn bindings(&self) -> &BTreeMap<String, GameAction> {
        &self.bindings
    }
}

impl DecisionSink for ActionSink {
    fn emit(&mut self, event: &DecisionEvent) {
        let Some(&action) = self.bindings.get(&event.label) else {
            return;
        };

        let dispatched = DispatchedAction {
            action,
            event: event.clone(),
        };

        match self.sender.try_send(dispatched) {
            Ok(()) => {}
            Err(TrySendError::Full(dispatched)) => {
                if let Ok(old) = self.stale.try_recv() {
                    tracing::debug!(action = ?old.action, "replacing undelivered action");
                }
                if let Err(e) = self.sender.try_send(dispatched) {
                    tracing::debug!(action = ?e.into_inner().action, "action dropped");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("action consumer has gone away");
            }
        }
    }
}

/// Consumer side of [`action_channel`].
pub struct ActionReceiver {
    receiver: Receiver<DispatchedAction>,
}

impl ActionReceiver {
    /// Take the pending action, if any, without blocking.
    pub fn poll(&self) -> Option<DispatchedAction> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for an action.
    pub fn wait(&self, timeout: Duration) -> Option<DispatchedAction> {
        match self.receiver.recv_timeout(timeout) {
            Ok(action) => Some(action),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Decisions of one session, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub profile: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub events: Vec<DecisionEvent>,
}

/// Keeps every decision of the session for export.
pub struct SessionRecorder {
    session_id: Uuid,
    profile: String,
    started_at: DateTime<Utc>,
    events: Vec<DecisionEvent>,
}

impl SessionRecorder {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            profile: profile.into(),
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> String {
        self.session_id.to_string()
    }

    pub fn events(&self) -> &[DecisionEvent] {
        &self.events
    }

    pub fn to_export(&self) -> SessionExport {
        SessionExport {
            session_id: self.session_id(),
            profile: self.profile.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            events: self.events.clone(),
        }
    }

    /// Write the session to `session_<timestamp>.json` under `dir`.
    ///
    /// Returns `None` without writing if nothing was decided.
    pub fn export(&self, dir: &Path) -> Result<Option<PathBuf>, std::io::Error> {
        if self.events.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "session_{}.json",
            self.started_at.format("%Y%m%d_%H%M%S")
        ));

        let json =
            serde_json::to_string_pretty(&self.to_export()).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;

        Ok(Some(path))
    }
}

impl DecisionSink for SessionRecorder {
    fn emit(&mut self, event: &DecisionEvent) {
        self.events.push(event.clone());
    }
}

/// Forwards each decision to several sinks in order.
#[derive(Default)]
pub struct FanoutSink<'a> {
    sinks: Vec<&'a mut dyn DecisionSink>,
}

impl<'a> FanoutSink<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: &'a mut dyn DecisionSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DecisionSink for FanoutSink<'_> {
    fn emit(&mut self, event: &DecisionEvent) {
        for sink in self.sinks.iter_mut() {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(label: &str, confidence: f64, timestamp: f64) -> DecisionEvent {
        DecisionEvent {
            label: label.to_string(),
            confidence,
            timestamp,
        }
    }

    fn game_bindings() -> BTreeMap<String, GameAction> {
        BTreeMap::from([
            ("clench".to_string(), GameAction::Jump),
            ("wrist".to_string(), GameAction::Duck),
        ])
    }

    #[test]
    fn test_console_format() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.emit(&event("clench", 0.876, 1.0));

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "Predicted movement: clench (Confidence: 0.88)\n");
    }

    #[test]
    fn test_action_dispatch() {
        let (mut sink, receiver) = action_channel(game_bindings());

        sink.emit(&event("rest", 0.9, 0.0));
        assert!(receiver.poll().is_none());

        sink.emit(&event("clench", 0.9, 1.0));
        let dispatched = receiver.poll().unwrap();
        assert_eq!(dispatched.action, GameAction::Jump);
        assert_eq!(dispatched.event.timestamp, 1.0);
    }

    #[test]
    fn test_newer_action_replaces_pending_one() {
        let (mut sink, receiver) = action_channel(game_bindings());

        sink.emit(&event("clench", 0.9, 1.0));
        sink.emit(&event("wrist", 0.9, 2.0));

        let dispatched = receiver.poll().unwrap();
        assert_eq!(dispatched.action, GameAction::Duck);
        assert!(receiver.poll().is_none());
    }

    #[test]
    fn test_racing_consumer_still_gets_latest_action() {
        let (mut sink, receiver) = action_channel(game_bindings());

        let consumer = std::thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(dispatched) = receiver.wait(Duration::from_millis(200)) {
                seen.push(dispatched.event.timestamp);
            }
            seen
        });

        for i in 0..100 {
            sink.emit(&event("clench", 0.9, i as f64));
        }

        let seen = consumer.join().unwrap();
        assert_eq!(seen.last(), Some(&99.0));
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_emit_after_consumer_is_gone() {
        let (mut sink, receiver) = action_channel(game_bindings());
        drop(receiver);

        sink.emit(&event("clench", 0.9, 1.0));
        sink.emit(&event("wrist", 0.9, 2.0));
        assert_eq!(sink.bindings().len(), 2);
    }

    #[test]
    fn test_action_wait_times_out() {
        let (_sink, receiver) = action_channel(game_bindings());
        assert!(receiver.wait(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_recorder_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::new("console");

        assert!(recorder.export(dir.path()).unwrap().is_none());

        recorder.emit(&event("index", 0.8, 2.5));
        let path = recorder.export(dir.path()).unwrap().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let export: SessionExport = serde_json::from_str(&content).unwrap();
        assert_eq!(export.session_id, recorder.session_id());
        assert_eq!(export.profile, "console");
        assert_eq!(export.events, vec![event("index", 0.8, 2.5)]);
    }

    #[test]
    fn test_fanout_forwards_to_all() {
        let mut recorder = SessionRecorder::new("console");
        let mut console = ConsoleSink::new(Vec::new());

        {
            let mut fanout = FanoutSink::new().with(&mut recorder).with(&mut console);
            assert_eq!(fanout.len(), 2);
            fanout.emit(&event("rest", 0.95, 0.0));
        }

        assert_eq!(recorder.events().len(), 1);
        assert!(!console.into_inner().is_empty());
    }
}
