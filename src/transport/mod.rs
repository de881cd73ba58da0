//! Sensor transport for the EMG sensor agent.
//!
//! This module reads textual samples from a serial device, stdin or a
//! recording, and parses them into sensor values.

pub mod line;
pub mod types;

// Re-export commonly used types
pub use line::{LineClock, LineCollector, LinePoll, TransportError};
pub use types::{decode_latin1, parse_sample, RawLine, SampleParseError, TransportMessage};
