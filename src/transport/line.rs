//! Line-oriented sensor transport.
//!
//! A background thread reads lines from a serial device, stdin or a recorded
//! file and forwards them, stamped with their arrival time, over a bounded
//! channel. The pipeline pulls from the channel on its own thread, so the
//! reader never touches pipeline state.

use crate::config::{SourceConfig, TransportConfig};
use crate::transport::types::{decode_latin1, RawLine, TransportMessage};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Capacity of the line channel.
const CHANNEL_CAPACITY: usize = 10_000;

/// Errors that end a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {target}: {error}")]
    Open {
        target: String,
        #[source]
        error: std::io::Error,
    },

    #[error("read from {0} failed: {1}")]
    Read(String, String),

    #[error("{0} disconnected")]
    Disconnected(String),

    #[error("no data from {target} for {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

/// How arriving lines are timestamped.
#[derive(Debug, Clone)]
pub enum LineClock {
    /// Seconds elapsed since the transport was opened
    Monotonic(Instant),
    /// Fixed spacing, for replaying recordings deterministically
    Synthetic { period_secs: f64, index: u64 },
}

impl LineClock {
    pub fn monotonic() -> Self {
        LineClock::Monotonic(Instant::now())
    }

    pub fn synthetic(rate_hz: f64) -> Self {
        LineClock::Synthetic {
            period_secs: 1.0 / rate_hz,
            index: 0,
        }
    }

    fn stamp(&mut self) -> f64 {
        match self {
            LineClock::Monotonic(start) => start.elapsed().as_secs_f64(),
            LineClock::Synthetic { period_secs, index } => {
                let t = *index as f64 * *period_secs;
                *index += 1;
                t
            }
        }
    }
}

/// Result of waiting for the next line.
#[derive(Debug, Clone, PartialEq)]
pub enum LinePoll {
    Line(RawLine),
    /// Nothing arrived within the poll interval
    Idle,
    /// The source ended normally
    Ended,
}

/// Reads sensor lines on a background thread.
pub struct LineCollector {
    receiver: Receiver<TransportMessage>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    /// Identifier of the source, for messages
    target: String,
    read_timeout: Option<Duration>,
    last_line_at: Instant,
    /// Whether end of input means the device went away
    end_is_disconnect: bool,
}

impl LineCollector {
    /// Open the configured source and start reading.
    ///
    /// Serial devices get the configured settle delay before the first read.
    pub fn open(config: &TransportConfig) -> Result<Self, TransportError> {
        let target = config.source.describe();
        let open_file = |path: &std::path::Path| {
            File::open(path).map_err(|error| TransportError::Open {
                target: target.clone(),
                error,
            })
        };

        let (reader, clock, end_is_disconnect): (Box<dyn BufRead + Send>, LineClock, bool) =
            match &config.source {
                SourceConfig::Serial { port } => {
                    let file = open_file(std::path::Path::new(port))?;
                    tracing::info!(
                        port = %port,
                        baud_rate = config.baud_rate,
                        settle_ms = config.settle_delay.as_millis() as u64,
                        "opened serial device"
                    );
                    thread::sleep(config.settle_delay);
                    (Box::new(BufReader::new(file)), LineClock::monotonic(), true)
                }
                SourceConfig::Stdin => (
                    Box::new(BufReader::new(std::io::stdin())),
                    LineClock::monotonic(),
                    false,
                ),
                SourceConfig::Replay { path } => {
                    let file = open_file(path)?;
                    (
                        Box::new(BufReader::new(file)),
                        LineClock::synthetic(config.replay_rate_hz),
                        false,
                    )
                }
            };

        let mut collector = Self::from_reader(reader, clock, target);
        collector.read_timeout = config.read_timeout;
        collector.end_is_disconnect = end_is_disconnect;
        Ok(collector)
    }

    /// Start reading from an arbitrary line source.
    pub fn from_reader<R>(reader: R, clock: LineClock, target: impl Into<String>) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));

        let thread_running = running.clone();
        let handle = thread::spawn(move || {
            read_lines(reader, clock, sender, thread_running);
        });

        Self {
            receiver,
            running,
            thread_handle: Some(handle),
            target: target.into(),
            read_timeout: None,
            last_line_at: Instant::now(),
            end_is_disconnect: false,
        }
    }

    /// Fail with [`TransportError::Timeout`] after this long without a line.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Wait up to `poll` for the next line.
    pub fn recv(&mut self, poll: Duration) -> Result<LinePoll, TransportError> {
        match self.receiver.recv_timeout(poll) {
            Ok(TransportMessage::Line(line)) => {
                self.last_line_at = Instant::now();
                Ok(LinePoll::Line(line))
            }
            Ok(TransportMessage::Closed) => {
                self.running.store(false, Ordering::SeqCst);
                if self.end_is_disconnect {
                    Err(TransportError::Disconnected(self.target.clone()))
                } else {
                    Ok(LinePoll::Ended)
                }
            }
            Ok(TransportMessage::Failed(message)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(TransportError::Read(self.target.clone(), message))
            }
            Err(RecvTimeoutError::Timeout) => match self.read_timeout {
                Some(timeout) if self.last_line_at.elapsed() > timeout => {
                    Err(TransportError::Timeout {
                        target: self.target.clone(),
                        timeout,
                    })
                }
                _ => Ok(LinePoll::Idle),
            },
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::Disconnected(self.target.clone()))
            }
        }
    }

    /// Stop reading. A reader blocked on the device exits after its next line.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the handle detaches the thread; a blocking read cannot be interrupted.
        self.thread_handle.take();
    }

    /// Check if the reader thread is still delivering lines.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for LineCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_lines<R: BufRead>(
    mut reader: R,
    mut clock: LineClock,
    sender: Sender<TransportMessage>,
    running: Arc<AtomicBool>,
) {
    let mut buf = Vec::with_capacity(64);

    while running.load(Ordering::SeqCst) {
        buf.clear();
        let message = match reader.read_until(b'\n', &mut buf) {
            Ok(0) => TransportMessage::Closed,
            Ok(_) => {
                let text = decode_latin1(&buf);
                let text = text.trim_end_matches(&['\r', '\n'][..]);
                TransportMessage::Line(RawLine::new(text, clock.stamp()))
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => TransportMessage::Failed(e.to_string()),
        };

        let last = !matches!(message, TransportMessage::Line(_));
        if sender.send(message).is_err() || last {
            break;
        }
    }

    tracing::debug!("line reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drain(collector: &mut LineCollector) -> Vec<RawLine> {
        let mut lines = Vec::new();
        loop {
            match collector.recv(Duration::from_secs(1)).unwrap() {
                LinePoll::Line(line) => lines.push(line),
                LinePoll::Idle => continue,
                LinePoll::Ended => return lines,
            }
        }
    }

    #[test]
    fn test_reads_lines_with_synthetic_clock() {
        let input = Cursor::new(b"100\r\n200\n\xffnoise\n300".to_vec());
        let mut collector =
            LineCollector::from_reader(input, LineClock::synthetic(4.0), "test input");

        let lines = drain(&mut collector);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["100", "200", "\u{ff}noise", "300"]);

        let times: Vec<f64> = lines.iter().map(|l| l.received_at).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75]);
        assert!(!collector.is_running());
    }

    #[test]
    fn test_end_of_device_is_a_disconnect() {
        let mut collector =
            LineCollector::from_reader(Cursor::new(Vec::new()), LineClock::monotonic(), "dev");
        collector.end_is_disconnect = true;

        let result = collector.recv(Duration::from_secs(1));
        assert!(matches!(result, Err(TransportError::Disconnected(_))));
    }

    struct Silent;

    impl std::io::Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(Duration::from_millis(200));
            Err(std::io::Error::new(ErrorKind::Interrupted, "no data yet"))
        }
    }

    #[test]
    fn test_read_timeout() {
        let mut collector =
            LineCollector::from_reader(BufReader::new(Silent), LineClock::monotonic(), "silent")
                .with_read_timeout(Some(Duration::from_millis(50)));

        assert_eq!(collector.recv(Duration::from_millis(10)).unwrap(), LinePoll::Idle);
        thread::sleep(Duration::from_millis(60));
        let result = collector.recv(Duration::from_millis(10));
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
    }

    #[test]
    fn test_open_replay_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial.txt");
        std::fs::write(&path, "512\n530\n498\n").unwrap();

        let config = TransportConfig {
            source: SourceConfig::Replay { path },
            replay_rate_hz: 4.0,
            ..Default::default()
        };
        let mut collector = LineCollector::open(&config).unwrap();

        let lines = drain(&mut collector);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["512", "530", "498"]);

        let times: Vec<f64> = lines.iter().map(|l| l.received_at).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5]);
        assert!(!collector.is_running());
    }

    #[test]
    fn test_open_missing_device() {
        let config = TransportConfig {
            source: SourceConfig::Serial {
                port: "/nonexistent/ttyEMG0".to_string(),
            },
            ..Default::default()
        };
        assert!(matches!(
            LineCollector::open(&config),
            Err(TransportError::Open { .. })
        ));
    }
}
