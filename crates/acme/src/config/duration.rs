//! Duration and integer parsing for provider configuration values
//!
//! Durations use the compact unit grammar found in DNS provider settings:
//! `300ms`, `1m30s`, `1.5h`. A bare `0` is zero; any other value needs a unit.

use std::time::Duration;

use crate::error::ParseError;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Largest accepted duration, in nanoseconds (signed 64-bit range)
const MAX_NANOS: u128 = i64::MAX as u128;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{b5}s" | "\u{3bc}s" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration such as `"90s"`, `"2m"` or `"1h15m30.5s"`
pub fn parse_duration(value: &str) -> Result<Duration, ParseError> {
    if value.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut rest = value;
    if let Some(stripped) = rest.strip_prefix('-') {
        if stripped == "0" {
            return Ok(Duration::ZERO);
        }
        return Err(ParseError::NegativeDuration(value.to_string()));
    }
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(ParseError::InvalidDuration(value.to_string()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        // Integer part
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        // Fraction part
        let (frac_digits, after_frac) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(ParseError::InvalidDuration(value.to_string()));
        }

        let unit_len = after_frac
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(after_frac.len());
        let (unit, remaining) = after_frac.split_at(unit_len);

        if unit.is_empty() {
            return Err(ParseError::MissingUnit(value.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| ParseError::UnknownUnit {
            unit: unit.to_string(),
            value: value.to_string(),
        })?;

        let whole = parse_digits(int_digits)
            .and_then(|v| v.checked_mul(scale))
            .ok_or_else(|| ParseError::DurationOverflow(value.to_string()))?;
        let fraction = fraction_nanos(frac_digits, scale);

        total = total
            .checked_add(whole)
            .and_then(|t| t.checked_add(fraction))
            .filter(|t| *t <= MAX_NANOS)
            .ok_or_else(|| ParseError::DurationOverflow(value.to_string()))?;

        rest = remaining;
    }

    let secs = (total / NANOS_PER_SEC) as u64;
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}

/// Parse a signed decimal integer such as `"120"` or `"-1"`
pub fn parse_integer(value: &str) -> Result<i64, ParseError> {
    if value.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(value.parse::<i64>()?)
}

/// Parse a duration taken from the process environment
///
/// Environment values historically hold a number of seconds, so a bare
/// integer is accepted in addition to the unit grammar.
pub fn parse_env_duration(value: &str) -> Result<Duration, ParseError> {
    match value.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => parse_duration(value),
    }
}

fn parse_digits(digits: &str) -> Option<u128> {
    digits.bytes().try_fold(0u128, |acc, b| {
        acc.checked_mul(10)?.checked_add(u128::from(b - b'0'))
    })
}

fn fraction_nanos(digits: &str, scale: u128) -> u128 {
    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;
    for b in digits.bytes() {
        // Digits past nanosecond precision cannot change the result
        if denominator >= 10_u128.pow(20) {
            break;
        }
        numerator = numerator * 10 + u128::from(b - b'0');
        denominator *= 10;
    }
    numerator * scale / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::from_nanos(7));
    }

    #[test]
    fn test_parse_compound_and_fraction() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_duration("1h15m30.5s").unwrap(),
            Duration::from_millis((3600 + 15 * 60 + 30) * 1000 + 500)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("+10s").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("-0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_duration(""), Err(ParseError::Empty));
        assert!(matches!(
            parse_duration("5x"),
            Err(ParseError::UnknownUnit { ref unit, .. }) if unit == "x"
        ));
        assert!(matches!(parse_duration("5"), Err(ParseError::MissingUnit(_))));
        assert!(matches!(parse_duration("1m30"), Err(ParseError::MissingUnit(_))));
        assert!(matches!(parse_duration("s"), Err(ParseError::InvalidDuration(_))));
        assert!(matches!(parse_duration("."), Err(ParseError::InvalidDuration(_))));
        assert!(matches!(parse_duration("+"), Err(ParseError::InvalidDuration(_))));
        assert!(matches!(
            parse_duration("-5s"),
            Err(ParseError::NegativeDuration(_))
        ));
        assert!(matches!(
            parse_duration("9999999999h"),
            Err(ParseError::DurationOverflow(_))
        ));
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("120").unwrap(), 120);
        assert_eq!(parse_integer("-1").unwrap(), -1);
        assert_eq!(parse_integer(""), Err(ParseError::Empty));
        assert!(matches!(
            parse_integer("abc"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(parse_integer("12.5").is_err());
    }

    #[test]
    fn test_parse_env_duration_accepts_seconds() {
        assert_eq!(parse_env_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_env_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_env_duration("soon").is_err());
    }

    proptest! {
        #[test]
        fn prop_seconds_match_std(secs in 0u64..1_000_000) {
            prop_assert_eq!(
                parse_duration(&format!("{}s", secs)).unwrap(),
                Duration::from_secs(secs)
            );
        }

        #[test]
        fn prop_compound_is_sum(h in 0u64..1000, m in 0u64..60, s in 0u64..60) {
            let parsed = parse_duration(&format!("{}h{}m{}s", h, m, s)).unwrap();
            prop_assert_eq!(parsed, Duration::from_secs(h * 3600 + m * 60 + s));
        }

        #[test]
        fn prop_never_panics(input in "\\PC{0,12}") {
            let _ = parse_duration(&input);
        }
    }
}
