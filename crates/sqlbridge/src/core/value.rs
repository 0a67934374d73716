//! Typed values bound to statement parameters and materialized from rows.
//!
//! The session treats these as opaque payloads: it hands them to the native
//! driver unchanged and counts rows, never inspects individual values.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::ValueType;

/// A single column value.
///
/// NULL carries the semantic type it stands in for so drivers that need a
/// typed NULL on the wire can pick the right encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with a type hint.
    Null(ValueType),

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer.
    Integer(i64),

    /// Double precision floating point.
    Number(f64),

    /// Arbitrary precision decimal.
    BigNumber(Decimal),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
}

/// One materialized row.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// The semantic type this value belongs to.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => ValueType::Boolean,
            SqlValue::Integer(_) => ValueType::Integer,
            SqlValue::Number(_) => ValueType::Number,
            SqlValue::BigNumber(_) => ValueType::BigNumber,
            SqlValue::Text(_) | SqlValue::Uuid(_) => ValueType::String,
            SqlValue::Bytes(_) => ValueType::Binary,
            SqlValue::Date(_) | SqlValue::Time(_) => ValueType::Date,
            SqlValue::DateTime(_) | SqlValue::DateTimeOffset(_) => ValueType::Timestamp,
        }
    }

    /// Integer view of numeric values, used for sequence and count results.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::BigNumber(d) => i64::try_from(d.trunc()).ok(),
            SqlValue::Number(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow text content, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", if *v { "Y" } else { "N" }),
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Number(v) => write!(f, "{}", v),
            SqlValue::BigNumber(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "{}", hex::encode(v)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y/%m/%d")),
            SqlValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.3f")),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y/%m/%d %H:%M:%S%.3f")),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Number(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::BigNumber(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null(ValueType::String).is_null());
        assert!(!SqlValue::Integer(42).is_null());
    }

    #[test]
    fn test_null_keeps_type_hint() {
        assert_eq!(
            SqlValue::Null(ValueType::BigNumber).value_type(),
            ValueType::BigNumber
        );
    }

    #[test]
    fn test_as_i64_conversions() {
        assert_eq!(SqlValue::Integer(7).as_i64(), Some(7));
        assert_eq!(SqlValue::BigNumber(Decimal::new(4200, 2)).as_i64(), Some(42));
        assert_eq!(SqlValue::Text(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(SqlValue::Number(1.5).as_i64(), None);
        assert_eq!(SqlValue::Null(ValueType::Integer).as_i64(), None);
    }

    #[test]
    fn test_from_implementations() {
        let v: SqlValue = 42i32.into();
        assert_eq!(v, SqlValue::Integer(42));

        let v: SqlValue = "hello".into();
        assert_eq!(v, SqlValue::Text("hello".to_string()));
    }
}
