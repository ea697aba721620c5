/// Error taxonomy for the bridge: per-frame drops, stream failures and sink failures
use thiserror::Error;

/// Why buffered input could not be cut into a decodable unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingErrorKind {
    #[error("empty line")]
    EmptyLine,
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("stream ended before the unit was complete")]
    Incomplete,
}

/// A unit that was dropped before decoding was attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct FramingError {
    kind: FramingErrorKind,
    raw: Vec<u8>,
}

impl FramingError {
    pub fn new(kind: FramingErrorKind, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    pub fn kind(&self) -> &FramingErrorKind {
        &self.kind
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Why a recognised unit failed field extraction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("oversized frame: expected {expected} bytes, got {actual}")]
    Oversized { expected: usize, actual: usize },
    #[error("invalid hex character {character:?} at position {index}")]
    InvalidHex { character: char, index: usize },
    #[error("odd-length hex string ({length} digits)")]
    OddLengthHex { length: usize },
    #[error("invalid UTF-8 after {valid_up_to} bytes")]
    InvalidUtf8 { valid_up_to: usize },
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("JSON payload is not an object")]
    NotAnObject,
}

/// A failed decode attempt. Terminal for that frame only.
///
/// The original bytes are retained so a dropped frame can be inspected or
/// replayed later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct DecodeError {
    kind: DecodeErrorKind,
    raw: Vec<u8>,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    /// Human-readable failure reason
    pub fn reason(&self) -> String {
        self.kind.to_string()
    }

    /// Original bytes, verbatim
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Original bytes rendered as uppercase hex
    pub fn raw_payload(&self) -> String {
        hex::encode_upper(&self.raw)
    }
}

/// Any per-frame failure. The surrounding session always continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl FrameError {
    pub fn reason(&self) -> String {
        match self {
            FrameError::Framing(e) => e.kind().to_string(),
            FrameError::Decode(e) => e.reason(),
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            FrameError::Framing(e) => e.raw(),
            FrameError::Decode(e) => e.raw(),
        }
    }

    pub fn raw_payload(&self) -> String {
        hex::encode_upper(self.raw())
    }
}

/// I/O-level failure on the input stream
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },
    /// Failure reported by an already-open port
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stream closed")]
    Disconnected,
}

/// A sink refused or failed to store a decoded record
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),
    #[error("store write failed: {0}")]
    Store(#[from] std::io::Error),
    #[error("sink task failed: {0}")]
    Join(String),
}

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_query_failure_is_a_stream_error() {
        let err = StreamError::from(serialport::Error::new(
            serialport::ErrorKind::NoDevice,
            "device unplugged",
        ));
        assert!(matches!(err, StreamError::Port(_)));
        assert_eq!(err.to_string(), "serial port error: device unplugged");
    }

    #[test]
    fn incomplete_unit_keeps_raw_bytes() {
        let raw = vec![0xAB, 0x01];
        let err = FrameError::from(FramingError::new(FramingErrorKind::Incomplete, raw));
        assert_eq!(err.reason(), "stream ended before the unit was complete");
        assert_eq!(err.raw_payload(), "AB01");
    }
}
