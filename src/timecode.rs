//! Wall clock strings used by the annotation table.

/// Parses `HH:MM:SS` or `HH:MM:SS:mmm` into seconds.
///
/// A missing fourth field means zero milliseconds. The millisecond field is
/// taken as an integer count, so `"00:00:01:5"` is 1.005 s.
pub fn parse_clock(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() < 3 || parts.len() > 4 {
        return None;
    }
    let mut fields = [0u64; 4];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.trim().parse().ok()?;
    }
    let [hours, minutes, seconds, millis] = fields;
    let whole = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(whole as f64 + millis as f64 / 1000.0)
}

/// Formats seconds as `HH:MM:SS:mmm`, rounded to the millisecond.
///
/// Hours are not wrapped at 24.
pub fn format_clock_millis(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}:{ms:03}",
        total_s / 3600,
        (total_s % 3600) / 60,
        total_s % 60
    )
}

/// Formats seconds as `HH:MM:SS`, truncating the fraction.
pub fn format_clock(seconds: f64) -> String {
    let total_s = seconds.max(0.0).floor() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total_s / 3600,
        (total_s % 3600) / 60,
        total_s % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_millis() {
        assert_eq!(parse_clock("01:02:03:500"), Some(3723.5));
        assert_eq!(parse_clock("00:00:10"), Some(10.0));
        assert_eq!(parse_clock(" 10:00:00 "), Some(36_000.0));
    }

    #[test]
    fn rejects_malformed_clock() {
        assert_eq!(parse_clock(""), None);
        assert_eq!(parse_clock("12:30"), None);
        assert_eq!(parse_clock("aa:00:00"), None);
        assert_eq!(parse_clock("00:00:00:000:1"), None);
        assert_eq!(parse_clock("-1:00:00"), None);
        assert_eq!(parse_clock("9999999999999999:00:00"), None);
        assert_eq!(parse_clock("00:999999999999999999:00"), None);
    }

    #[test]
    fn formats_millis_with_rounding() {
        assert_eq!(format_clock_millis(3723.5), "01:02:03:500");
        assert_eq!(format_clock_millis(0.0), "00:00:00:000");
        assert_eq!(format_clock_millis(59.9996), "00:01:00:000");
        assert_eq!(format_clock_millis(90_000.25), "25:00:00:250");
        assert_eq!(format_clock_millis(-3.0), "00:00:00:000");
    }

    #[test]
    fn formats_display_clock() {
        assert_eq!(format_clock(3723.9), "01:02:03");
        assert_eq!(format_clock(5.0), "00:00:05");
    }

    #[test]
    fn round_trips_through_text() {
        for secs in [0.001, 12.345, 3599.999, 43_210.5] {
            let back = parse_clock(&format_clock_millis(secs)).expect("formatted clock parses");
            assert!((back - secs).abs() < 0.0005, "{secs} came back as {back}");
        }
    }
}
