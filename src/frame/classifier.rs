/// Encoding classification for one delimited unit of input
use crate::models::FrameMode;

/// Decode path chosen for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Fixed-length binary frame; decided by channel configuration only
    Binary,
    /// Hex digits wrapping a UTF-8 JSON object
    HexText,
    /// Plain JSON text (fallback)
    JsonText,
}

/// Choose the decode path for a unit read in the given mode
///
/// Binary channels never run the heuristic. Text units are tested for hex
/// first; anything else falls through to JSON.
pub fn classify(mode: FrameMode, unit: &[u8]) -> Encoding {
    match mode {
        FrameMode::Binary => Encoding::Binary,
        FrameMode::Text => classify_text(unit),
    }
}

/// Hex if, with whitespace removed, the unit is a non-empty even-length run of
/// hex digits. Otherwise JSON.
pub fn classify_text(unit: &[u8]) -> Encoding {
    let mut digits = 0usize;
    for &byte in unit {
        if byte.is_ascii_whitespace() {
            continue;
        }
        if !byte.is_ascii_hexdigit() {
            return Encoding::JsonText;
        }
        digits += 1;
    }

    if digits > 0 && digits % 2 == 0 {
        Encoding::HexText
    } else {
        Encoding::JsonText
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_mode_skips_heuristic() {
        assert_eq!(classify(FrameMode::Binary, b"{}"), Encoding::Binary);
        assert_eq!(classify(FrameMode::Binary, b"abcd"), Encoding::Binary);
    }

    #[test]
    fn even_length_hex_is_hex_text() {
        assert_eq!(classify_text(b"7B7D"), Encoding::HexText);
        assert_eq!(classify_text(b"7b 7d\r"), Encoding::HexText);
        assert_eq!(classify_text(b"deadBEEF"), Encoding::HexText);
    }

    #[test]
    fn odd_length_or_non_hex_falls_back_to_json() {
        assert_eq!(classify_text(b"7B7"), Encoding::JsonText);
        assert_eq!(classify_text(b"7G7D"), Encoding::JsonText);
        assert_eq!(classify_text(br#"{"packet_count":1}"#), Encoding::JsonText);
        assert_eq!(classify_text(b"   "), Encoding::JsonText);
    }

    #[test]
    fn text_mode_uses_heuristic() {
        assert_eq!(classify(FrameMode::Text, b"00ff"), Encoding::HexText);
        assert_eq!(classify(FrameMode::Text, b"[1]"), Encoding::JsonText);
    }
}
