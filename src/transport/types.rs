//! Raw line types and sample parsing for the sensor transport.
//!
//! The sensor firmware prints one integer reading per line. Anything else on
//! the line (boot banners, partial lines after a reset, line noise) fails to
//! parse and is skipped by the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One line read from the sensor, stamped at arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLine {
    /// Line text without its terminator
    pub text: String,
    /// Arrival time in seconds since the transport was opened
    pub received_at: f64,
}

impl RawLine {
    pub fn new(text: impl Into<String>, received_at: f64) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }
}

/// Messages sent from the reader thread.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    Line(RawLine),
    /// The source reached end of input
    Closed,
    /// Reading failed; the reader thread has stopped
    Failed(String),
}

/// Why a line is not a usable sample.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SampleParseError {
    #[error("empty line")]
    Empty,
    #[error("not an integer sample: {0:?}")]
    NotAnInteger(String),
}

/// Parse a line as a sensor reading.
pub fn parse_sample(line: &str) -> Result<f64, SampleParseError> {
    let text = line.trim();
    if text.is_empty() {
        return Err(SampleParseError::Empty);
    }

    text.parse::<i64>()
        .map(|v| v as f64)
        .map_err(|_| SampleParseError::NotAnInteger(text.to_string()))
}

/// Decode raw bytes as Latin-1, where every byte is one character.
///
/// Serial noise is therefore never a decoding error, only a parse error.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample() {
        assert_eq!(parse_sample("512"), Ok(512.0));
        assert_eq!(parse_sample("  -7\r"), Ok(-7.0));
        assert_eq!(parse_sample("+3"), Ok(3.0));
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert_eq!(parse_sample(""), Err(SampleParseError::Empty));
        assert_eq!(parse_sample(" \r"), Err(SampleParseError::Empty));
        assert!(matches!(
            parse_sample("51\u{fe}2"),
            Err(SampleParseError::NotAnInteger(_))
        ));
        assert!(parse_sample("3.5").is_err());
        assert!(parse_sample("Sensor ready").is_err());
        assert!(parse_sample("99999999999999999999999").is_err());
    }

    #[test]
    fn test_decode_latin1_never_fails() {
        assert_eq!(decode_latin1(b"1023"), "1023");
        let noisy = decode_latin1(&[0x35, 0xff, 0x00, 0x80]);
        assert_eq!(noisy.chars().count(), 4);
        assert_eq!(noisy.chars().nth(1), Some('\u{ff}'));
    }
}
