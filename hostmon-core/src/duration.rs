//! Go-style duration strings (`"24h"`, `"1h30m"`, `"1.5s"`, `"250ms"`).
//!
//! These are what operators already type for retention windows and history
//! queries, so both configuration and the HTTP layer accept them.

use crate::error::{HostmonError, Result};
use std::time::Duration;

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3600 * 1_000_000_000),
];

fn invalid(input: &str, reason: impl Into<String>) -> HostmonError {
    HostmonError::InvalidDuration { input: input.to_string(), reason: reason.into() }
}

/// Parse a Go-style duration into signed nanoseconds.
pub fn parse_signed_nanos(input: &str) -> Result<i128> {
    let mut rest = input;
    let mut negative = false;
    if let Some(stripped) = rest.strip_prefix('-') {
        negative = true;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    if rest == "0" {
        return Ok(0);
    }
    if rest.is_empty() {
        return Err(invalid(input, "empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_num) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(input, "expected a number"));
        }

        let unit_len = after_num
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after_num.len());
        let (unit, remaining) = after_num.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid(input, "missing unit"));
        }

        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| invalid(input, format!("unknown unit '{}'", unit)))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid(input, "number out of range"))?
        };

        let mut component = whole
            .checked_mul(scale)
            .ok_or_else(|| invalid(input, "duration out of range"))?;

        if !frac_part.is_empty() {
            // Fractional digits beyond nanosecond resolution are truncated.
            let digits = &frac_part[..frac_part.len().min(18)];
            let numerator: u128 =
                digits.parse().map_err(|_| invalid(input, "number out of range"))?;
            let denominator = 10u128.pow(digits.len() as u32);
            component += numerator * scale / denominator;
        }

        total = total
            .checked_add(component)
            .ok_or_else(|| invalid(input, "duration out of range"))?;
        rest = remaining;
    }

    if total > i64::MAX as u128 {
        return Err(invalid(input, "duration out of range"));
    }

    let total = total as i128;
    Ok(if negative { -total } else { total })
}

/// Parse a non-negative Go-style duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let nanos = parse_signed_nanos(input)?;
    if nanos < 0 {
        return Err(invalid(input, "duration must not be negative"));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Format a duration in the same grammar (e.g. `1h30m0s`, `1500ms`, `10µs`).
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.subsec_nanos();
    if nanos % 1_000_000 != 0 {
        return if nanos % 1_000 == 0 {
            format!("{}µs", duration.as_micros())
        } else {
            format!("{}ns", duration.as_nanos())
        };
    }
    if nanos != 0 {
        return format!("{}ms", duration.as_millis());
    }

    let secs = duration.as_secs();

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Serde adapter storing a [`Duration`] as a Go-style duration string.
pub mod serde_go {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(24 * 3600));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m3.25s").unwrap(), Duration::from_millis(123_250));
        assert_eq!(parse_duration("1440h").unwrap(), Duration::from_secs(60 * 24 * 3600));
    }

    #[test]
    fn test_parse_zero_and_sign() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("+5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_signed_nanos("-1s").unwrap(), -1_000_000_000);
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "bogus", "10", "h", "1d", "1.h2", "5 m", "-", "."] {
            assert!(parse_duration(input).is_err(), "expected '{}' to be rejected", input);
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m0s");
        assert_eq!(format_duration(Duration::from_secs(61)), "1m1s");
        assert_eq!(format_duration(Duration::from_secs(9)), "9s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(parse_duration(&format_duration(Duration::from_millis(1500))).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_format_sub_millisecond_durations() {
        assert_eq!(format_duration(Duration::from_micros(10)), "10µs");
        assert_eq!(format_duration(Duration::from_micros(1_500)), "1500µs");
        assert_eq!(format_duration(Duration::from_nanos(7)), "7ns");
        assert_eq!(format_duration(Duration::new(1, 5)), "1000000005ns");

        for value in [Duration::from_micros(10), Duration::from_nanos(7), Duration::new(2, 1_000)] {
            assert_eq!(parse_duration(&format_duration(value)).unwrap(), value);
        }
    }
}
