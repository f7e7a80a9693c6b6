//! Cross-dialect value equality.
//!
//! The rule order matters: null-equivalence and the static type-name
//! compatibility table run before numeric coercion and string comparison, so
//! a pure dialect naming difference ("int" vs "integer") never surfaces as a
//! data mismatch.

use crate::core::value::SqlValue;

/// MSSQL type-name token mapped to its PostgreSQL equivalents.
///
/// Used when comparing metadata-carrying columns (for example a replicated
/// data dictionary) where one side stores MSSQL type names and the other
/// PostgreSQL names for the same logical type.
const TYPE_COMPAT: &[(&str, &[&str])] = &[
    ("varchar", &["character varying", "varchar"]),
    ("nvarchar", &["character varying", "nvarchar"]),
    ("int", &["integer", "int", "int4"]),
    ("bigint", &["bigint", "int8"]),
    ("smallint", &["smallint", "int2"]),
    ("tinyint", &["smallint", "int2"]),
    ("decimal", &["decimal", "numeric"]),
    ("numeric", &["numeric", "decimal"]),
    ("float", &["float", "float8", "double precision"]),
    ("real", &["real", "float4"]),
    ("bit", &["boolean", "bool", "bit"]),
    ("datetime", &["timestamp", "timestamp without time zone", "datetime"]),
    ("datetime2", &["timestamp", "timestamp without time zone"]),
    ("datetimeoffset", &["timestamptz", "timestamp with time zone"]),
    ("date", &["date"]),
    ("time", &["time", "time without time zone"]),
    ("text", &["text"]),
    ("ntext", &["text"]),
    ("char", &["char", "character"]),
    ("nchar", &["char", "character"]),
    ("uniqueidentifier", &["uuid"]),
    ("varbinary", &["bytea"]),
    ("binary", &["bytea"]),
    ("image", &["bytea"]),
    ("money", &["numeric", "money"]),
    ("xml", &["xml"]),
];

/// True when the two trimmed, lowercased tokens name compatible types
/// across the two dialects (checked in both directions).
fn type_names_compatible(a: &str, b: &str) -> bool {
    for (mssql, pg) in TYPE_COMPAT {
        if a == *mssql && pg.contains(&b) {
            return true;
        }
        if b == *mssql && pg.contains(&a) {
            return true;
        }
    }
    false
}

/// Decide whether a source value and a target value represent the same
/// logical value.
///
/// Rules in priority order:
/// 1. both null/empty/NaN-equivalent
/// 2. both are known cross-dialect type-name tokens
/// 3. both numeric-coercible, equal as f64
/// 4. either textual, equal as trimmed lowercased strings
/// 5. fallback: normalized string forms match
pub fn values_equal(source: &SqlValue, target: &SqlValue) -> bool {
    if source.is_null_like() && target.is_null_like() {
        return true;
    }
    if source.is_null_like() != target.is_null_like() {
        return false;
    }

    if let (SqlValue::String(a), SqlValue::String(b)) = (source, target) {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if type_names_compatible(&a, &b) {
            return true;
        }
    }

    if let (Some(a), Some(b)) = (source.as_f64(), target.as_f64()) {
        return a == b;
    }

    if source.is_text() || target.is_text() {
        return source.normalized() == target.normalized();
    }

    source.normalized() == target.normalized()
}
