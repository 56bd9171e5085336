//! Literal values carried by column expressions and in-memory rows.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// An `f64` with the IEEE total order, so rows containing floats can key
/// deduplication maps and participate in stable sorts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct F64(pub f64);

impl From<f64> for F64 {
    fn from(v: f64) -> Self {
        F64(v)
    }
}

impl From<F64> for f64 {
    fn from(v: F64) -> Self {
        v.0
    }
}

impl PartialEq for F64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for F64 {}

impl PartialOrd for F64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl Ord for F64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for F64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for F64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single literal value.
///
/// This is the value vocabulary of column expressions and of rows in the
/// iteration engine. The full enum is `Eq + Ord + Hash` so that complete
/// rows can be compared, sorted, and used as deduplication keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(F64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

/// The type of a literal value, where one is statically known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl Datum {
    pub fn float(v: f64) -> Self {
        Datum::Float(F64(v))
    }

    pub fn text(v: impl Into<String>) -> Self {
        Datum::Text(v.into())
    }

    /// The type of this value, or `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(DataType::Bool),
            Datum::Int(_) => Some(DataType::Int),
            Datum::Float(_) => Some(DataType::Float),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Bytes(_) => Some(DataType::Bytes),
            Datum::Date(_) => Some(DataType::Date),
            Datum::Time(_) => Some(DataType::Time),
            Datum::Timestamp(_) => Some(DataType::Timestamp),
            Datum::TimestampTz(_) => Some(DataType::TimestampTz),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Interpret this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Int(i) => write!(f, "{i}"),
            Datum::Float(v) => write!(f, "{v}"),
            Datum::Text(s) => f.write_str(s),
            Datum::Bytes(b) => write!(f, "[{} bytes]", b.len()),
            Datum::Date(d) => write!(f, "{d}"),
            Datum::Time(t) => write!(f, "{t}"),
            Datum::Timestamp(ts) => write!(f, "{ts}"),
            Datum::TimestampTz(ts) => write!(f, "{ts}"),
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Float(F64(v))
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_float_total_order() {
        assert_eq!(F64(f64::NAN), F64(f64::NAN));
        assert!(F64(-0.0) < F64(0.0));
        assert!(F64(1.0) < F64(f64::NAN));
    }

    #[test]
    fn test_datum_hashing_handles_floats() {
        let mut seen = HashSet::new();
        assert!(seen.insert(Datum::float(1.5)));
        assert!(!seen.insert(Datum::float(1.5)));
        assert!(seen.insert(Datum::float(f64::NAN)));
        assert!(!seen.insert(Datum::float(f64::NAN)));
    }

    #[test]
    fn test_datum_ordering_within_variant() {
        assert!(Datum::Int(1) < Datum::Int(2));
        assert!(Datum::text("a") < Datum::text("b"));
    }

    #[test]
    fn test_data_type() {
        assert_eq!(Datum::Null.data_type(), None);
        assert_eq!(Datum::Int(3).data_type(), Some(DataType::Int));
        assert_eq!(Datum::float(0.0).data_type(), Some(DataType::Float));
    }
}
