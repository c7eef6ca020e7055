//! Lap-time and wall-clock parsing helpers.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};

use crate::types::LAP_TIME_SENTINEL;

/// Parse a lap time into seconds.
///
/// Accepts `m:ss.mmm`, `h:mm:ss.mmm` and plain seconds (`83.456`). A comma
/// is accepted as the decimal separator. Returns `None` for empty,
/// non-numeric, negative or out-of-range values.
pub fn parse_lap_time(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let (seconds_part, whole_parts) = parts.split_last()?;
    let seconds: f64 = seconds_part.replace(',', ".").parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    if !whole_parts.is_empty() && seconds >= 60.0 {
        return None;
    }

    let mut total = 0.0;
    for part in whole_parts {
        let value: u32 = part.trim().parse().ok()?;
        total = total * 60.0 + f64::from(value);
    }
    let total = total * 60.0 + seconds;

    (total > 0.0).then_some(total)
}

/// Format seconds as `m:ss.mmm` (or `h:mm:ss.mmm` past an hour).
///
/// Sentinel and non-positive values format as an empty string.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_lap_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= LAP_TIME_SENTINEL {
        return String::new();
    }

    let total_ms = (seconds * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}.{millis:03}")
    } else {
        format!("{minutes}:{secs:02}.{millis:03}")
    }
}

/// Parse a wall-clock timestamp into seconds.
///
/// Supports RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS(.fff)`, time of day
/// `HH:MM:SS(.fff)` (seconds since midnight) and raw numeric seconds.
/// Values from one document must use a single form to be comparable.
#[allow(clippy::cast_precision_loss)]
pub fn parse_clock(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(seconds) = text.parse::<f64>() {
        return seconds.is_finite().then_some(seconds);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis() as f64 / 1000.0);
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp_millis() as f64 / 1000.0);
        }
    }

    let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()?;
    Some(f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) / 1e9)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-6)
    }

    #[test]
    fn parses_minutes_seconds() {
        assert!(approx(parse_lap_time("1:23.456"), 83.456));
        assert!(approx(parse_lap_time(" 2:00.000 "), 120.0));
        assert!(approx(parse_lap_time("1:23,456"), 83.456));
    }

    #[test]
    fn parses_hours_and_plain_seconds() {
        assert!(approx(parse_lap_time("1:02:03.500"), 3723.5));
        assert!(approx(parse_lap_time("83.456"), 83.456));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_lap_time(""), None);
        assert_eq!(parse_lap_time("DNF"), None);
        assert_eq!(parse_lap_time("1:75.000"), None);
        assert_eq!(parse_lap_time("-5.0"), None);
        assert_eq!(parse_lap_time("0.000"), None);
        assert_eq!(parse_lap_time("1:2:3:4"), None);
    }

    #[test]
    fn formats_lap_times() {
        assert_eq!(format_lap_time(83.456), "1:23.456");
        assert_eq!(format_lap_time(59.9999), "1:00.000");
        assert_eq!(format_lap_time(3723.5), "1:02:03.500");
        assert_eq!(format_lap_time(LAP_TIME_SENTINEL), "");
        assert_eq!(format_lap_time(-1.0), "");
    }

    #[test]
    fn format_and_parse_agree() {
        let text = format_lap_time(97.125);
        assert!(approx(parse_lap_time(&text), 97.125));
    }

    #[test]
    fn parses_clock_forms() {
        assert!(approx(parse_clock("130"), 130.0));
        assert!(approx(parse_clock("14:02:10.500"), 50_530.5));
        assert!(approx(parse_clock("00:01:40"), 100.0));
        assert!(approx(
            parse_clock("2025-01-25T14:02:10.500Z"),
            1_737_813_730.5
        ));
        assert!(approx(
            parse_clock("2025-01-25 14:02:10"),
            1_737_813_730.0
        ));
        assert_eq!(parse_clock("soon"), None);
    }
}
