//! Dynamically typed table cells and rows.
//!
//! The store is row-oriented and the column set of a statements table varies
//! from filing to filing, so a row is an ordered map from column name to a
//! SQLite-compatible scalar.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// One row of a table.
pub type Record = BTreeMap<String, Scalar>;

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the cell. Text is not parsed here; use the cleaner for that.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Renders the cell for display and for text-typed lookups.
    pub fn to_display(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Real(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Integer(_) | Scalar::Real(_) => 1,
            Scalar::Text(_) => 2,
        }
    }

    /// Total order used when sorting tables: nulls first, then numbers
    /// (compared numerically across integer and real), then text.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Integer(a), Scalar::Integer(b)) => a.cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Real(f)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Scalar::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Scalar::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for Scalar {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Scalar::Null),
            ValueRef::Integer(i) => Ok(Scalar::Integer(i)),
            ValueRef::Real(f) => Ok(Scalar::Real(f)),
            ValueRef::Text(_) => value.as_str().map(|s| Scalar::Text(s.to_string())),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// Reads a text column, treating null and blank as absent.
pub fn text_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Scalar::as_text)
        .filter(|s| !s.trim().is_empty())
}

/// Compares two rows on an ordered list of columns; a missing column sorts as null.
pub fn compare_on(a: &Record, b: &Record, keys: &[String]) -> Ordering {
    for key in keys {
        let left = a.get(key).unwrap_or(&Scalar::Null);
        let right = b.get(key).unwrap_or(&Scalar::Null);
        match left.total_cmp(right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
