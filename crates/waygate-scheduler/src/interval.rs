// SPDX-License-Identifier: Apache-2.0
use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,
    #[error("invalid interval '{0}': expected <number><unit> with unit in s/m/h/d")]
    Malformed(String),
}

/// Parse the `<number><unit>` interval grammar, `unit ∈ {s, m, h, d}`.
/// This dialect is trivially regular, so it is parsed inline rather than
/// reaching for a duration-parsing crate.
pub fn parse_interval(raw: &str) -> Result<Duration, IntervalError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(IntervalError::Empty);
    }
    let unit = raw.chars().last().ok_or_else(|| IntervalError::Malformed(raw.to_string()))?;
    let digits = &raw[..raw.len() - unit.len_utf8()];
    let n: i64 = digits.parse().map_err(|_| IntervalError::Malformed(raw.to_string()))?;
    if n <= 0 {
        return Err(IntervalError::Malformed(raw.to_string()));
    }

    match unit {
        's' => Ok(Duration::seconds(n)),
        'm' => Ok(Duration::minutes(n)),
        'h' => Ok(Duration::hours(n)),
        'd' => Ok(Duration::days(n)),
        _ => Err(IntervalError::Malformed(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds() {
        assert_eq!(parse_interval("30s").unwrap(), Duration::seconds(30));
    }

    #[test]
    fn parses_minutes() {
        assert_eq!(parse_interval("5m").unwrap(), Duration::minutes(5));
    }

    #[test]
    fn parses_hours() {
        assert_eq!(parse_interval("2h").unwrap(), Duration::hours(2));
    }

    #[test]
    fn parses_days() {
        assert_eq!(parse_interval("1d").unwrap(), Duration::days(1));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(parse_interval(""), Err(IntervalError::Empty));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_interval("5x").is_err());
    }

    #[test]
    fn rejects_zero() {
        assert!(parse_interval("0s").is_err());
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(parse_interval("fives").is_err());
    }
}
