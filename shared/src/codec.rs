//! Line-oriented wire codec
//!
//! Inbound, each message is one line: either a JSON object
//! `{"objeto": "<label>", "tamaño": <n>}` or a bare text label. Outbound,
//! each message is one command token per line, optionally preceded by
//! `SET_SPEED_RIGHT <n>` and `SET_SPEED_LEFT <n>` lines when the velocity
//! profile changes.
//!
//! Report decoding is deliberately tolerant: a payload that fails to parse as
//! JSON degrades to a label-only report instead of being rejected. Only the
//! framing itself can fail, when a peer streams bytes without ever sending a
//! newline.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::VelocityProfile;
use crate::{Command, SensorReport};

/// Maximum accepted line length; a peer exceeding this is misbehaving
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Errors that can occur while framing the inbound stream
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("inbound line too long: {0} bytes (max: {MAX_LINE_LEN})")]
    LineTooLong(usize),
}

/// The raw camera report as it appears on the wire.
///
/// Field names are the protocol contract; unknown extra fields (robot id,
/// timestamps, battery level) are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct WireReport {
    #[serde(rename = "objeto", default)]
    label: String,
    #[serde(rename = "tamaño", default)]
    size: u32,
}

/// Decode one inbound line into a report.
///
/// JSON payloads use the `objeto`/`tamaño` fields directly (label
/// lower-cased, missing size defaults to 0). Anything that does not parse as
/// JSON is taken as a bare label with size 0.
pub fn decode_report(line: &str) -> SensorReport {
    let trimmed = line.trim();
    match serde_json::from_str::<WireReport>(trimmed) {
        Ok(wire) => SensorReport {
            label: wire.label.to_lowercase(),
            size: wire.size,
        },
        Err(_) => SensorReport {
            label: trimmed.to_lowercase(),
            size: 0,
        },
    }
}

/// Encode a report as a wire line (robot side)
pub fn encode_report(report: &SensorReport) -> String {
    let wire = WireReport {
        label: report.label.clone(),
        size: report.size,
    };
    // WireReport serialization cannot fail: two plain fields
    let mut line = serde_json::to_string(&wire).unwrap_or_default();
    line.push('\n');
    line
}

/// Encode a command as its terminated wire token
pub fn encode_command(command: Command) -> String {
    format!("{}\n", command.token())
}

/// Encode the two speed-set lines for a profile change, right side first.
///
/// Each line is returned separately so the caller can write them as separate
/// sends and attribute a partial-write failure to the exact token.
pub fn encode_speed_lines(profile: VelocityProfile) -> [String; 2] {
    [
        format!("SET_SPEED_RIGHT {}\n", profile.right),
        format!("SET_SPEED_LEFT {}\n", profile.left),
    ]
}

/// Accumulates stream bytes and yields complete lines.
///
/// An empty read on the underlying socket means the peer closed; that is the
/// caller's signal, not this decoder's. `next_line` returning `Ok(None)` only
/// ever means "need more data".
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete line, without its terminator.
    ///
    /// Call repeatedly until it returns `Ok(None)` to drain all buffered
    /// lines. Tolerates CRLF terminators and non-UTF-8 bytes (replaced).
    pub fn next_line(&mut self) -> Result<Option<String>, CodecError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let line = self.buffer.split_to(pos + 1);
                let text = String::from_utf8_lossy(&line[..pos]);
                Ok(Some(text.trim_end_matches('\r').to_string()))
            }
            None if self.buffer.len() > MAX_LINE_LEN => {
                Err(CodecError::LineTooLong(self.buffer.len()))
            }
            None => Ok(None),
        }
    }

    /// Current buffered byte count (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_report() {
        let report = decode_report(r#"{"objeto": "Cuadrado", "tamaño": 6000}"#);
        assert_eq!(report.label, "cuadrado");
        assert_eq!(report.size, 6000);
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let line = r#"{"objeto": "cilindro", "tamaño": 150, "robot_id": "ESP32-01", "bateria": 87}"#;
        let report = decode_report(line);
        assert_eq!(report.label, "cilindro");
        assert_eq!(report.size, 150);
    }

    #[test]
    fn test_decode_missing_size_defaults_to_zero() {
        let report = decode_report(r#"{"objeto": "cuadrado"}"#);
        assert_eq!(report.label, "cuadrado");
        assert_eq!(report.size, 0);
    }

    #[test]
    fn test_decode_plain_text_fallback() {
        let report = decode_report("  CUADRADO \r");
        assert_eq!(report.label, "cuadrado");
        assert_eq!(report.size, 0);
    }

    #[test]
    fn test_decode_empty_line_is_blank_report() {
        let report = decode_report("");
        assert_eq!(report, SensorReport::empty());
    }

    #[test]
    fn test_report_roundtrip() {
        let original = SensorReport::new("contenedor_cuadrado", 31000);
        let line = encode_report(&original);
        assert!(line.ends_with('\n'));
        assert_eq!(decode_report(&line), original);
    }

    #[test]
    fn test_encode_command() {
        assert_eq!(encode_command(Command::TurnLeft), "TURN_LEFT\n");
        assert_eq!(encode_command(Command::Grab), "GRAB\n");
    }

    #[test]
    fn test_encode_speed_lines_right_first() {
        let lines = encode_speed_lines(VelocityProfile::new(80, 90));
        assert_eq!(lines[0], "SET_SPEED_RIGHT 90\n");
        assert_eq!(lines[1], "SET_SPEED_LEFT 80\n");
    }

    #[test]
    fn test_line_decoder_splits_chunks() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"{\"objeto\": \"cua");
        assert!(decoder.next_line().unwrap().is_none());

        decoder.extend(b"drado\", \"tama\xc3\xb1o\": 30}\ncilindro\n");
        let first = decoder.next_line().unwrap().unwrap();
        assert_eq!(decode_report(&first).label, "cuadrado");

        let second = decoder.next_line().unwrap().unwrap();
        assert_eq!(second, "cilindro");

        assert!(decoder.next_line().unwrap().is_none());
    }

    #[test]
    fn test_line_decoder_strips_crlf() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"STOP\r\n");
        assert_eq!(decoder.next_line().unwrap().unwrap(), "STOP");
    }

    #[test]
    fn test_line_decoder_rejects_unbounded_line() {
        let mut decoder = LineDecoder::new();
        decoder.extend(&vec![b'x'; MAX_LINE_LEN + 1]);
        assert!(matches!(
            decoder.next_line(),
            Err(CodecError::LineTooLong(_))
        ));
    }
}
