//! Session statistics for the streaming classifier.
//!
//! Counts what the pipeline did with its input so an operator can tell a
//! quiet electrode from a noisy line or a failing classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct SessionStats {
    /// Samples accepted into the window buffer
    samples_received: AtomicU64,
    /// Lines dropped because they did not parse as a sample
    lines_skipped: AtomicU64,
    /// Windows that produced a valid prediction
    windows_classified: AtomicU64,
    /// Windows dropped because the classifier failed
    oracle_failures: AtomicU64,
    /// Decision events handed to the sinks
    decisions_emitted: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
    /// Totals saved by earlier sessions
    previous: Option<PersistedStats>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            samples_received: AtomicU64::new(0),
            lines_skipped: AtomicU64::new(0),
            windows_classified: AtomicU64::new(0),
            oracle_failures: AtomicU64::new(0),
            decisions_emitted: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
            previous: None,
        }
    }

    /// Create stats whose saved totals include previous sessions.
    ///
    /// The live counters start at zero; earlier totals are only added back in
    /// [`cumulative`](Self::cumulative) and [`save`](Self::save).
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("could not load previous session stats: {e}");
        }

        stats
    }

    pub fn record_sample(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_line(&self) {
        self.lines_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_classified(&self) {
        self.windows_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oracle_failure(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decision(&self) {
        self.decisions_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            lines_skipped: self.lines_skipped.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            decisions_emitted: self.decisions_emitted.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Totals across this and all previously saved sessions.
    pub fn cumulative(&self) -> PersistedStats {
        let session = self.snapshot();
        let previous = self.previous.as_ref();
        let earlier = |f: fn(&PersistedStats) -> u64| previous.map_or(0, f);

        PersistedStats {
            samples_received: earlier(|p| p.samples_received) + session.samples_received,
            lines_skipped: earlier(|p| p.lines_skipped) + session.lines_skipped,
            windows_classified: earlier(|p| p.windows_classified) + session.windows_classified,
            oracle_failures: earlier(|p| p.oracle_failures) + session.oracle_failures,
            decisions_emitted: earlier(|p| p.decisions_emitted) + session.decisions_emitted,
            last_updated: Utc::now(),
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Samples received: {}\n\
             - Lines skipped: {}\n\
             - Windows classified: {}\n\
             - Classifier failures: {}\n\
             - Decisions emitted: {}\n\
             - Session duration: {} seconds",
            stats.samples_received,
            stats.lines_skipped,
            stats.windows_classified,
            stats.oracle_failures,
            stats.decisions_emitted,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = self.cumulative();
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                self.previous = Some(PersistedStats::read(path)?);
            }
        }
        Ok(())
    }

    /// Reset this session's counters.
    pub fn reset(&self) {
        self.samples_received.store(0, Ordering::Relaxed);
        self.lines_skipped.store(0, Ordering::Relaxed);
        self.windows_classified.store(0, Ordering::Relaxed);
        self.oracle_failures.store(0, Ordering::Relaxed);
        self.decisions_emitted.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_received: u64,
    pub lines_skipped: u64,
    pub windows_classified: u64,
    pub oracle_failures: u64,
    pub decisions_emitted: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    pub samples_received: u64,
    pub lines_skipped: u64,
    pub windows_classified: u64,
    pub oracle_failures: u64,
    pub decisions_emitted: u64,
    pub last_updated: DateTime<Utc>,
}

impl PersistedStats {
    /// Read totals saved by a previous session.
    pub fn read(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }
}

/// Thread-safe shared session stats.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}
