//! Converters from raw fact text to typed [`Value`]s.
//!
//! The set of converters is closed; the only open-ended variant is
//! [`Converter::Custom`], which carries an injected function. Converters are
//! total: parse failures resolve to a fallback value, never an error.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::value::{Amount, Value};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

type ConvertFn = dyn Fn(Option<&str>) -> Value + Send + Sync;

/// Caller-supplied conversion function.
#[derive(Clone)]
pub struct CustomConverter(Arc<ConvertFn>);

impl CustomConverter {
    /// Wraps a conversion function.
    pub fn new(f: impl Fn(Option<&str>) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Applies the conversion.
    #[must_use]
    pub fn call(&self, raw: Option<&str>) -> Value {
        (self.0)(raw)
    }
}

impl fmt::Debug for CustomConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomConverter(..)")
    }
}

/// A raw-text to typed-value conversion.
#[derive(Debug, Clone, Default)]
pub enum Converter {
    /// Identity; null becomes the empty string.
    #[default]
    String,
    /// Lowercased atom; blank becomes null.
    Symbol,
    /// Leading integer; anything else becomes 0.
    Integer,
    /// Two-digit decimal; anything else becomes 0.00.
    Amount,
    /// `"true"` or `"1"`.
    Boolean,
    /// Date/time; unparsable becomes null.
    Timestamp,
    /// Caller-supplied conversion.
    Custom(CustomConverter),
}

impl Converter {
    /// Looks up a converter by tag. Unknown tags fall back to [`Converter::String`].
    ///
    /// `custom` cannot be named by tag because it needs a function; it also
    /// falls back to string.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "symbol" => Self::Symbol,
            "integer" => Self::Integer,
            "amount" => Self::Amount,
            "boolean" => Self::Boolean,
            "timestamp" | "datetime" => Self::Timestamp,
            _ => Self::String,
        }
    }

    /// Shorthand for [`Converter::Custom`].
    pub fn custom(f: impl Fn(Option<&str>) -> Value + Send + Sync + 'static) -> Self {
        Self::Custom(CustomConverter::new(f))
    }

    /// Configuration tag; `custom` for closures.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Integer => "integer",
            Self::Amount => "amount",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Custom(_) => "custom",
        }
    }

    /// Converts a raw value.
    #[must_use]
    pub fn convert(&self, raw: Option<&str>) -> Value {
        match self {
            Self::String => Value::String(raw.unwrap_or_default().to_string()),
            Self::Symbol => match raw.map(str::trim) {
                None | Some("") => Value::Null,
                Some(s) => Value::Symbol(s.to_lowercase()),
            },
            Self::Integer => Value::Int(raw.map_or(0, parse_leading_int)),
            Self::Amount => Value::Amount(raw.and_then(Amount::parse).unwrap_or(Amount::ZERO)),
            Self::Boolean => Value::Bool(matches!(raw, Some("true" | "1"))),
            Self::Timestamp => raw.and_then(parse_timestamp).map_or(Value::Null, Value::Timestamp),
            Self::Custom(f) => f.call(raw),
        }
    }
}

/// Parses an optional sign and leading digits, ignoring the rest.
fn parse_leading_int(raw: &str) -> i64 {
    let s = raw.trim_start();
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits_len = s[sign_len..].bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return 0;
    }
    s[..sign_len + digits_len].parse().unwrap_or(0)
}

/// Parses RFC 3339 or a handful of naive layouts (read as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_string_converter() {
        assert_eq!(Converter::String.convert(Some("Curiosity")), Value::from("Curiosity"));
        assert_eq!(Converter::String.convert(None), Value::from(""));
    }

    #[test]
    fn test_symbol_converter() {
        assert_eq!(Converter::Symbol.convert(Some("Sedan")), Value::Symbol("sedan".to_string()));
        assert_eq!(Converter::Symbol.convert(Some("  ")), Value::Null);
        assert_eq!(Converter::Symbol.convert(None), Value::Null);
    }

    #[test]
    fn test_integer_converter() {
        assert_eq!(Converter::Integer.convert(Some("46")), Value::Int(46));
        assert_eq!(Converter::Integer.convert(Some(" -12abc")), Value::Int(-12));
        assert_eq!(Converter::Integer.convert(Some("4.5")), Value::Int(4));
        assert_eq!(Converter::Integer.convert(Some("abc")), Value::Int(0));
        assert_eq!(Converter::Integer.convert(None), Value::Int(0));
    }

    #[test]
    fn test_amount_converter() {
        assert_eq!(
            Converter::Amount.convert(Some("45.96")),
            Value::Amount(Amount::from_cents(4596))
        );
        assert_eq!(Converter::Amount.convert(None), Value::Amount(Amount::ZERO));
        assert_eq!(Converter::Amount.convert(Some("n/a")), Value::Amount(Amount::ZERO));
        assert_eq!(
            Converter::Amount.convert(Some("4.596e3")),
            Value::Amount(Amount::from_cents(459_600))
        );
    }

    #[test]
    fn test_boolean_converter() {
        assert_eq!(Converter::Boolean.convert(Some("true")), Value::Bool(true));
        assert_eq!(Converter::Boolean.convert(Some("1")), Value::Bool(true));
        assert_eq!(Converter::Boolean.convert(Some("false")), Value::Bool(false));
        assert_eq!(Converter::Boolean.convert(Some("0")), Value::Bool(false));
        assert_eq!(Converter::Boolean.convert(Some("TRUE")), Value::Bool(false));
        assert_eq!(Converter::Boolean.convert(None), Value::Bool(false));
    }

    #[test]
    fn test_timestamp_converter_valid() {
        let expected = Utc.with_ymd_and_hms(2013, 4, 3, 0, 0, 0).unwrap();
        assert_eq!(
            Converter::Timestamp.convert(Some("2013-04-03 0:0")),
            Value::Timestamp(expected)
        );
        assert_eq!(
            Converter::Timestamp.convert(Some("2013-04-03")),
            Value::Timestamp(expected)
        );
        assert_eq!(
            Converter::Timestamp.convert(Some("2013-04-03T02:00:00+02:00")),
            Value::Timestamp(expected)
        );
    }

    #[test]
    fn test_timestamp_converter_invalid_is_null() {
        for raw in [None, Some(""), Some("2013"), Some("yesterday")] {
            assert_eq!(Converter::Timestamp.convert(raw), Value::Null);
        }
    }

    #[test]
    fn test_custom_converter() {
        let converter = Converter::custom(|raw| {
            Value::String(format!("Something fancy with {}.", raw.unwrap_or_default()))
        });
        assert_eq!(
            converter.convert(Some("the passed value")),
            Value::from("Something fancy with the passed value.")
        );
        assert_eq!(converter.tag(), "custom");
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Converter::from_tag("integer").tag(), "integer");
        assert_eq!(Converter::from_tag("datetime").tag(), "timestamp");
        assert_eq!(Converter::from_tag("Amount").tag(), "amount");
        assert_eq!(Converter::from_tag("no-such-tag").tag(), "string");
        assert_eq!(Converter::from_tag("custom").tag(), "string");
    }
}
