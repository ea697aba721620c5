use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Sentinel substituted for fields a text report does not carry
pub const NOT_AVAILABLE: &str = "N/A";

/// How the input channel delivers frames. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Fixed 18-byte binary frames
    Binary,
    /// Newline-terminated hex or JSON lines
    Text,
}

impl FromStr for FrameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "bin" => Ok(FrameMode::Binary),
            "text" | "line" => Ok(FrameMode::Text),
            other => Err(format!("unknown frame mode '{}'", other)),
        }
    }
}

impl fmt::Display for FrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameMode::Binary => f.write_str("binary"),
            FrameMode::Text => f.write_str("text"),
        }
    }
}

/// Reading decoded from a fixed-layout binary frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReading {
    pub timestamp: String,
    /// 12 uppercase hex digits, canonical (big-endian) order
    pub device_mac: String,
    pub packet_no: u16,
    /// Degrees Celsius, two decimals
    pub temperature: f64,
    /// Percent, unscaled
    pub humidity: u16,
    /// Pascal, unscaled
    pub pressure: u32,
}

/// Reading decoded from a hex-wrapped or plain JSON text report
///
/// Text reports are lenient: every field is kept as the device sent it, and
/// any missing field holds the `"N/A"` sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextReading {
    pub timestamp: String,
    pub packet_count: Value,
    pub temperature: Value,
    pub humidity: Value,
    pub pressure: Value,
    pub device_name: Value,
    pub address: Value,
}

/// Canonical decoded telemetry unit handed to sinks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorRecord {
    Frame(FrameReading),
    Text(TextReading),
}

impl SensorRecord {
    /// JSON payload published to the broker
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Value to use when a text report leaves a field out
pub fn sentinel() -> Value {
    Value::String(NOT_AVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_mode_parses_case_insensitively() {
        assert_eq!("Binary".parse::<FrameMode>(), Ok(FrameMode::Binary));
        assert_eq!(" text ".parse::<FrameMode>(), Ok(FrameMode::Text));
        assert!("serial".parse::<FrameMode>().is_err());
    }

    #[test]
    fn frame_record_uses_canonical_wire_keys() {
        let record = SensorRecord::Frame(FrameReading {
            timestamp: "2024-01-01 00:00:00 UTC".into(),
            device_mac: "FFEEDDCCBBAA".into(),
            packet_no: 1,
            temperature: 60.0,
            humidity: 40,
            pressure: 101325,
        });
        let value: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": "2024-01-01 00:00:00 UTC",
                "device_mac": "FFEEDDCCBBAA",
                "packet_no": 1,
                "temperature": 60.0,
                "humidity": 40,
                "pressure": 101325
            })
        );
    }

    #[test]
    fn text_record_serializes_sentinels() {
        let record = SensorRecord::Text(TextReading {
            timestamp: "t".into(),
            packet_count: json!(5),
            temperature: json!(21.3),
            humidity: json!(40),
            pressure: json!(101325),
            device_name: sentinel(),
            address: sentinel(),
        });
        let value: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["device_name"], "N/A");
        assert_eq!(value["address"], "N/A");
        assert_eq!(value["packet_count"], 5);
    }
}
