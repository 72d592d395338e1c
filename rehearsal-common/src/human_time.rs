//! Human-readable position formatting
//!
//! Positions are rendered `M:SS.mmm` below one hour and `H:MM:SS.mmm` above,
//! which keeps log lines about skips and loops readable at a glance.

/// Format a song position in seconds
///
/// # Examples
///
/// ```
/// use rehearsal_common::human_time::format_position;
///
/// assert_eq!(format_position(0.0), "0:00.000");
/// assert_eq!(format_position(83.25), "1:23.250");
/// assert_eq!(format_position(3723.5), "1:02:03.500");
/// assert_eq!(format_position(-1.5), "-0:01.500");
/// ```
pub fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--:--".to_string();
    }

    let is_negative = seconds < 0.0;
    let total_ms = (seconds.abs() * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    let formatted = if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    } else {
        format!("{}:{:02}.{:03}", mins, secs, ms)
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format an optional position, `none` when absent
pub fn format_optional_position(seconds: Option<f64>) -> String {
    seconds
        .map(format_position)
        .unwrap_or_else(|| "none".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rounds_to_millisecond() {
        assert_eq!(format_position(1.0004), "0:01.000");
        assert_eq!(format_position(1.0006), "0:01.001");
    }

    #[test]
    fn test_format_minute_boundary() {
        assert_eq!(format_position(59.9999), "1:00.000");
    }

    #[test]
    fn test_format_non_finite() {
        assert_eq!(format_position(f64::NAN), "--:--");
    }

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional_position(None), "none");
        assert_eq!(format_optional_position(Some(10.0)), "0:10.000");
    }
}
