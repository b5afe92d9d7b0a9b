//! Timecode parsing and formatting.
//!
//! Shared by the progress parser (elapsed-time tokens in tool output) and
//! the queue snapshot. Supports `HH:MM:SS`, `HH:MM:SS.frac`, `MM:SS` and
//! bare `SS` forms.

use thiserror::Error;

/// Timecode parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimecodeError {
    #[error("timecode cannot be empty")]
    Empty,

    #[error("timecode cannot be negative")]
    Negative,

    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid timecode format '{0}'. Use HH:MM:SS, MM:SS, or SS")]
    InvalidFormat(String),
}

/// Parse a timecode string to total seconds.
///
/// # Examples
/// ```
/// use renderq_models::timecode::parse_timecode;
/// assert_eq!(parse_timecode("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timecode("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timecode("90").unwrap(), 90.0);
/// ```
pub fn parse_timecode(tc: &str) -> Result<f64, TimecodeError> {
    let tc = tc.trim();
    if tc.is_empty() {
        return Err(TimecodeError::Empty);
    }

    let parts: Vec<&str> = tc.split(':').collect();
    match parts.len() {
        1 => {
            let seconds: f64 = parts[0]
                .parse()
                .map_err(|_| TimecodeError::InvalidValue("seconds", parts[0].to_string()))?;
            if seconds < 0.0 {
                return Err(TimecodeError::Negative);
            }
            Ok(seconds)
        }
        2 => {
            let minutes: f64 = parts[0]
                .parse()
                .map_err(|_| TimecodeError::InvalidValue("minutes", parts[0].to_string()))?;
            let seconds: f64 = parts[1]
                .parse()
                .map_err(|_| TimecodeError::InvalidValue("seconds", parts[1].to_string()))?;
            if minutes < 0.0 || seconds < 0.0 {
                return Err(TimecodeError::Negative);
            }
            Ok(minutes * 60.0 + seconds)
        }
        3 => {
            let hours: f64 = parts[0]
                .parse()
                .map_err(|_| TimecodeError::InvalidValue("hours", parts[0].to_string()))?;
            let minutes: f64 = parts[1]
                .parse()
                .map_err(|_| TimecodeError::InvalidValue("minutes", parts[1].to_string()))?;
            let seconds: f64 = parts[2]
                .parse()
                .map_err(|_| TimecodeError::InvalidValue("seconds", parts[2].to_string()))?;
            if hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
                return Err(TimecodeError::Negative);
            }
            Ok(hours * 3600.0 + minutes * 60.0 + seconds)
        }
        _ => Err(TimecodeError::InvalidFormat(tc.to_string())),
    }
}

/// Format seconds into an `HH:MM:SS` or `HH:MM:SS.mmm` string.
pub fn format_timecode(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hh_mm_ss() {
        assert_eq!(parse_timecode("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_timecode("00:01:00").unwrap(), 60.0);
        assert_eq!(parse_timecode("01:00:00").unwrap(), 3600.0);
        assert_eq!(parse_timecode("00:00:05.50").unwrap(), 5.5);
    }

    #[test]
    fn test_parse_short_forms() {
        assert_eq!(parse_timecode("05:30").unwrap(), 330.0);
        assert_eq!(parse_timecode("90").unwrap(), 90.0);
        assert_eq!(parse_timecode("12.25").unwrap(), 12.25);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_timecode(""), Err(TimecodeError::Empty)));
        assert!(matches!(
            parse_timecode("aa:bb:cc"),
            Err(TimecodeError::InvalidValue(..))
        ));
        assert!(matches!(
            parse_timecode("1:2:3:4"),
            Err(TimecodeError::InvalidFormat(_))
        ));
        assert!(matches!(parse_timecode("-5"), Err(TimecodeError::Negative)));
    }

    #[test]
    fn test_format_roundtrip() {
        assert_eq!(format_timecode(0.0), "00:00:00");
        assert_eq!(format_timecode(5400.0), "01:30:00");
        assert_eq!(format_timecode(5.5), "00:00:05.500");
        assert_eq!(parse_timecode(&format_timecode(4923.75)).unwrap(), 4923.75);
    }
}
