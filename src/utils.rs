/// Utility functions for timestamps, rounding and hex rendering
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS UTC`
///
/// The instant is converted to UTC first. Falls back to the default string
/// representation if formatting fails.
pub fn format_timestamp(dt: &OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    let utc = dt.to_offset(UtcOffset::UTC);
    utc.format(&format).unwrap_or_else(|_| utc.to_string())
}

/// Current UTC instant, formatted for records
pub fn utc_timestamp() -> String {
    format_timestamp(&OffsetDateTime::now_utc())
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Render bytes as uppercase hex for logs and diagnostics
pub fn hex_upper(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamp_is_rendered_in_utc() {
        let dt = datetime!(2024-03-05 14:07:09 +02:00);
        assert_eq!(format_timestamp(&dt), "2024-03-05 12:07:09 UTC");
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round_to(21.456, 2), 21.46);
        assert_eq!(round_to(60.0, 2), 60.0);
    }

    #[test]
    fn hex_is_uppercase() {
        assert_eq!(hex_upper(&[0xab, 0x01]), "AB01");
    }
}
