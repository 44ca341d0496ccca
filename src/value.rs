//! Typed values produced by projection.
//!
//! Facts carry raw text; converters turn that text into a [`Value`]. Values
//! are totally ordered so collection fields can be returned sorted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-point decimal amount with two fractional digits, stored in cents.
///
/// # Examples
///
/// ```
/// use factline::Amount;
///
/// let amount = Amount::parse("45.955").unwrap();
/// assert_eq!(amount.cents(), 4596);
/// assert_eq!(amount.to_string(), "45.96");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// `0.00`.
    pub const ZERO: Self = Self(0);

    /// Wraps a count of cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// The amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Parses a decimal string, rounding half-up to two places.
    ///
    /// Accepts an optional sign and an optional `e`/`E` exponent
    /// (`"1.5e3"`). Returns `None` for anything else, and for exponents
    /// beyond [`Amount::MAX_EXPONENT`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
            Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
            None => (unsigned, 0),
        };
        if exponent.unsigned_abs() > Self::MAX_EXPONENT {
            return None;
        }
        let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let (whole, frac) = shift_point(whole, frac, exponent);
        let (whole, frac) = (whole.as_str(), frac.as_str());
        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut frac_digits = frac.bytes().map(|b| i64::from(b - b'0'));
        let tenths = frac_digits.next().unwrap_or(0);
        let hundredths = frac_digits.next().unwrap_or(0);
        let round_up = frac_digits.next().is_some_and(|d| d >= 5);

        let cents = whole
            .checked_mul(100)?
            .checked_add(tenths * 10 + hundredths + i64::from(round_up))?;
        Some(Self(if negative { -cents } else { cents }))
    }

    /// Largest exponent magnitude [`Amount::parse`] accepts.
    pub const MAX_EXPONENT: u32 = 18;

    /// Lossy conversion for display and arithmetic outside the fixed-point domain.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

/// Moves the decimal point of `whole.frac` by `exponent` places.
fn shift_point(whole: &str, frac: &str, exponent: i32) -> (String, String) {
    let digits = format!("{whole}{frac}");
    let point = i64::try_from(whole.len())
        .unwrap_or(i64::MAX)
        .saturating_add(i64::from(exponent));
    match usize::try_from(point) {
        Err(_) => {
            let pad = usize::try_from(-point).unwrap_or(0);
            (String::new(), format!("{}{digits}", "0".repeat(pad)))
        }
        Ok(point) if point >= digits.len() => {
            let pad = point - digits.len();
            (format!("{digits}{}", "0".repeat(pad)), String::new())
        }
        Ok(point) => (digits[..point].to_string(), digits[point..].to_string()),
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A projected, typed attribute value.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absent or unconvertible.
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Fixed-point money.
    Amount(Amount),
    /// Text as written.
    String(String),
    /// Lowercased enum-like atom.
    Symbol(String),
    /// UTC instant.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// True for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null or an empty string.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) | Self::Symbol(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The flag, if this is a boolean.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The amount, if this is one.
    pub const fn as_amount(&self) -> Option<Amount> {
        match self {
            Self::Amount(v) => Some(*v),
            _ => None,
        }
    }

    /// The text of a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The name of a [`Value::Symbol`].
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(v) => Some(v),
            _ => None,
        }
    }

    /// The instant, if this is a timestamp.
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Amount(_) => "amount",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Amount(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Symbol(v) => write!(f, ":{v}"),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Amount> for Value {
    fn from(v: Amount) -> Self {
        Self::Amount(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}
