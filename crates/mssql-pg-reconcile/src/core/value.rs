//! Typed SQL values shared by both database drivers.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// SQL value enum for type-safe row handling.
///
/// Both the MSSQL reader and the PostgreSQL reader decode into this enum so
/// the matcher and comparator never see driver-specific types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    /// True for NULL and NULL-equivalent values: NaN floats and strings that
    /// spell out a null after trimming ("", "nan", "none", "null").
    pub fn is_null_like(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::F32(f) => f.is_nan(),
            SqlValue::F64(f) => f.is_nan(),
            SqlValue::String(s) => {
                matches!(s.trim().to_lowercase().as_str(), "" | "nan" | "none" | "null")
            }
            _ => false,
        }
    }

    /// Attempt numeric coercion. Numbers convert directly; strings convert
    /// when they parse as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SqlValue::I16(v) => Some(*v as f64),
            SqlValue::I32(v) => Some(*v as f64),
            SqlValue::I64(v) => Some(*v as f64),
            SqlValue::F32(v) => Some(*v as f64),
            SqlValue::F64(v) => Some(*v),
            SqlValue::Decimal(d) => {
                use rust_decimal::prelude::ToPrimitive;
                d.to_f64()
            }
            SqlValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// True for textual values.
    pub fn is_text(&self) -> bool {
        matches!(self, SqlValue::String(_))
    }

    /// Canonical string form used for composite keys, fingerprints, and the
    /// comparator's fallback rule: trimmed and lowercased, NULL as "".
    pub fn normalized(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => {
                if v.is_nan() {
                    String::new()
                } else {
                    format!("{}", v)
                }
            }
            SqlValue::F64(v) => {
                if v.is_nan() {
                    String::new()
                } else {
                    format!("{}", v)
                }
            }
            SqlValue::Decimal(d) => d.normalize().to_string(),
            SqlValue::String(s) => s.trim().to_lowercase(),
            SqlValue::Bytes(b) => {
                // Prefer UTF-8 text; fall back to hex so binary data still keys stably.
                match std::str::from_utf8(b) {
                    Ok(s) => s.trim().to_lowercase(),
                    Err(_) => b.iter().map(|x| format!("{:02x}", x)).collect(),
                }
            }
            SqlValue::Uuid(u) => u.to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            SqlValue::DateTimeOffset(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::Time(t) => t.format("%H:%M:%S%.3f").to_string(),
        }
    }

    /// Display form for mismatch records: like `normalized` but preserves
    /// string case so report readers see the original value.
    pub fn display(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::String(s) => s.clone(),
            other => other.normalized(),
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
