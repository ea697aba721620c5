/// Frame decoding: binary telemetry frames and hex/JSON text reports
use serde_json::{Map, Value};

use crate::error::{DecodeError, DecodeErrorKind};
use crate::frame::classifier::{classify, classify_text, Encoding};
use crate::models::{sentinel, FrameMode, FrameReading, SensorRecord, TextReading};
use crate::utils::{round_to, utc_timestamp};

/// Size of one binary telemetry frame
pub const FRAME_LEN: usize = 18;

// Field offsets within a binary frame
const MAC_OFFSET: usize = 0;
const SEQUENCE_OFFSET: usize = 8;
const TEMPERATURE_OFFSET: usize = 10;
const HUMIDITY_OFFSET: usize = 12;
const PRESSURE_OFFSET: usize = 14;

const TEMPERATURE_SCALE: f64 = 10.0;

/// Decode one fixed-layout binary frame
///
/// The frame is 18 bytes, all integers little-endian:
/// - Bytes 0-5: MAC address, least significant byte first
/// - Bytes 6-7: reserved
/// - Bytes 8-9: packet sequence (u16)
/// - Bytes 10-11: temperature (u16, tenths of a degree Celsius)
/// - Bytes 12-13: humidity (u16, percent, unscaled)
/// - Bytes 14-17: pressure (u32, Pa, unscaled)
///
/// Decoding is strict: any other length is rejected and no partial record is
/// ever produced. The timestamp is taken from the host clock at decode time.
pub fn decode_binary(bytes: &[u8]) -> Result<SensorRecord, DecodeError> {
    if bytes.len() < FRAME_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::Truncated {
                expected: FRAME_LEN,
                actual: bytes.len(),
            },
            bytes,
        ));
    }
    if bytes.len() > FRAME_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::Oversized {
                expected: FRAME_LEN,
                actual: bytes.len(),
            },
            bytes,
        ));
    }

    match (|| -> Result<FrameReading, DecodeErrorKind> {
        let mac = canonical_mac(field::<6>(bytes, MAC_OFFSET)?);
        let packet_no = u16::from_le_bytes(field::<2>(bytes, SEQUENCE_OFFSET)?);
        let temperature_raw = u16::from_le_bytes(field::<2>(bytes, TEMPERATURE_OFFSET)?);
        let humidity = u16::from_le_bytes(field::<2>(bytes, HUMIDITY_OFFSET)?);
        let pressure = u32::from_le_bytes(field::<4>(bytes, PRESSURE_OFFSET)?);

        Ok(FrameReading {
            timestamp: utc_timestamp(),
            device_mac: format_mac(&mac),
            packet_no,
            temperature: temperature_celsius(temperature_raw),
            humidity,
            pressure,
        })
    })() {
        Ok(reading) => Ok(SensorRecord::Frame(reading)),
        Err(kind) => Err(DecodeError::new(kind, bytes)),
    }
}

/// Decode a hex string wrapping a UTF-8 JSON report
///
/// Whitespace is ignored. Trailing NUL bytes left by C-string senders are
/// dropped before the JSON is parsed.
pub fn decode_hex_text(line: &str) -> Result<SensorRecord, DecodeError> {
    let digits: String = line.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = hex::decode(&digits).map_err(|e| {
        let kind = match e {
            hex::FromHexError::InvalidHexCharacter { c, index } => DecodeErrorKind::InvalidHex {
                character: c,
                index,
            },
            hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
                DecodeErrorKind::OddLengthHex {
                    length: digits.len(),
                }
            }
        };
        DecodeError::new(kind, line.as_bytes())
    })?;

    let text = std::str::from_utf8(&bytes).map_err(|e| {
        DecodeError::new(
            DecodeErrorKind::InvalidUtf8 {
                valid_up_to: e.valid_up_to(),
            },
            line.as_bytes(),
        )
    })?;

    parse_report(text.trim_end_matches('\0'), line.as_bytes())
}

/// Decode a plain JSON report
pub fn decode_json_text(line: &str) -> Result<SensorRecord, DecodeError> {
    parse_report(line, line.as_bytes())
}

/// Classify a text line and decode it on the matching path
pub fn decode_text(raw: &[u8]) -> Result<SensorRecord, DecodeError> {
    let line = std::str::from_utf8(raw).map_err(|e| {
        DecodeError::new(
            DecodeErrorKind::InvalidUtf8 {
                valid_up_to: e.valid_up_to(),
            },
            raw,
        )
    })?;

    match classify_text(raw) {
        Encoding::HexText => decode_hex_text(line),
        _ => decode_json_text(line),
    }
}

/// Decode one unit read from a channel in the given mode
pub fn decode_unit(mode: FrameMode, raw: &[u8]) -> Result<SensorRecord, DecodeError> {
    match classify(mode, raw) {
        Encoding::Binary => decode_binary(raw),
        Encoding::HexText | Encoding::JsonText => decode_text(raw),
    }
}

/// Reverse wire (little-endian) MAC bytes into canonical order. Self-inverse.
pub fn canonical_mac(wire: [u8; 6]) -> [u8; 6] {
    let mut mac = wire;
    mac.reverse();
    mac
}

fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Raw tenths of a degree to Celsius, rounded to two decimals
pub fn temperature_celsius(raw: u16) -> f64 {
    round_to(raw as f64 / TEMPERATURE_SCALE, 2)
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], DecodeErrorKind> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(DecodeErrorKind::Truncated {
            expected: offset + N,
            actual: bytes.len(),
        })
}

fn parse_report(text: &str, raw: &[u8]) -> Result<SensorRecord, DecodeError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| DecodeError::new(DecodeErrorKind::InvalidJson(e.to_string()), raw))?;

    let Value::Object(mut fields) = value else {
        return Err(DecodeError::new(DecodeErrorKind::NotAnObject, raw));
    };

    // Canonical binary-record keys are accepted as aliases so a published
    // record can be fed back through the text path.
    Ok(SensorRecord::Text(TextReading {
        timestamp: utc_timestamp(),
        packet_count: take_field(&mut fields, &["packet_count", "packet_no"]),
        temperature: take_field(&mut fields, &["temperature"]),
        humidity: take_field(&mut fields, &["humidity"]),
        pressure: take_field(&mut fields, &["pressure"]),
        device_name: take_field(&mut fields, &["device_name"]),
        address: take_field(&mut fields, &["address", "device_mac"]),
    }))
}

fn take_field(fields: &mut Map<String, Value>, keys: &[&str]) -> Value {
    keys.iter()
        .find_map(|key| fields.remove(*key))
        .unwrap_or_else(sentinel)
}
