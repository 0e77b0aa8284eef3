//! Human duration parsing for delays and intervals.

use std::time::Duration;

/// Parses a human duration string.
///
/// Accepts a sequence of `<number><unit>` terms where unit is one of
/// `ms`, `s`, `m`, `h` (e.g. `"15s"`, `"1m30s"`, `"1.5h"`, `"250ms"`).
/// A bare number is read as seconds, so `"10"` equals `"10s"`.
///
/// Returns `None` for empty input, unknown units, or malformed numbers.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    // Bare numeric => seconds.
    if let Ok(secs) = s.parse::<f64>() {
        return from_secs_checked(secs);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return None;
        }
        let value: f64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];

        let (unit, next) = match rest {
            r if r.starts_with("ms") => (0.001, &r[2..]),
            r if r.starts_with('s') => (1.0, &r[1..]),
            r if r.starts_with('m') => (60.0, &r[1..]),
            r if r.starts_with('h') => (3600.0, &r[1..]),
            _ => return None,
        };
        total += from_secs_checked(value * unit)?;
        rest = next;
    }
    Some(total)
}

fn from_secs_checked(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::from_secs(5400)));
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn compound_terms_sum() {
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(
            parse_duration("1h2m3s"),
            Some(Duration::from_secs(3723))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration("-3s"), None);
    }
}
