//! Typed row and page representations.

use crate::core::value::SqlValue;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A single fetched row: column names shared with the page, values owned.
///
/// Column lookup is case-insensitive by design - MSSQL preserves the cased
/// identifiers while PostgreSQL folds unquoted identifiers to lowercase, so
/// the same logical column usually arrives with different spellings.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in fetch order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in fetch order.
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Case-insensitive column lookup.
    pub fn get_ci(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }

    /// Render the whole row as `col=value` pairs for Missing/Extra records.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (col, val) in self.columns.iter().zip(&self.values) {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(col);
            out.push('=');
            out.push_str(&val.display());
        }
        out
    }

    /// Content fingerprint: SHA-256 over normalized values of the named
    /// columns, in sorted column order so column ordering differences between
    /// the two dialects cannot skew the hash.
    ///
    /// A fingerprint difference is only a hint - callers must confirm with
    /// per-column comparison before reporting a mismatch. Fingerprint equality
    /// is trusted (the false-negative risk of a SHA-256 collision is accepted).
    pub fn fingerprint(&self, columns: &[String]) -> String {
        let mut sorted: Vec<&String> = columns.iter().collect();
        sorted.sort_by_key(|c| c.to_lowercase());

        let mut hasher = Sha256::new();
        for col in sorted {
            let norm = self
                .get_ci(col)
                .map(|v| v.normalized())
                .unwrap_or_default();
            hasher.update(norm.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Build the comparison key from the given columns' normalized values.
    pub fn key(&self, columns: &[String]) -> RowKey {
        RowKey(
            columns
                .iter()
                .map(|c| self.get_ci(c).map(|v| v.normalized()).unwrap_or_default())
                .collect(),
        )
    }
}

/// Row identity used for matching: the tuple of normalized key column values,
/// or of all common column values when the table has no declared key.
///
/// Equality of two `RowKey`s is what "the same row" means to the matcher. In
/// keyless mode this is a heuristic: two logically distinct rows with
/// identical content produce the same key and are treated as interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(pub Vec<String>);

impl RowKey {
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// One offset-bounded slice of a table's rows, tagged with the window that
/// fetched it. Produced by the batch fetchers, consumed by the matcher.
#[derive(Debug, Clone)]
pub struct RowPage {
    pub offset: i64,
    pub limit: i64,
    pub columns: Arc<Vec<String>>,
    pub rows: Vec<Row>,
}

impl RowPage {
    /// An empty page, used when a batch fetch fails and is recovered.
    pub fn empty(offset: i64, limit: i64) -> Self {
        Self {
            offset,
            limit,
            columns: Arc::new(Vec::new()),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Lowercased column names, for computing the common-column intersection.
    pub fn column_names_lower(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.to_lowercase()).collect()
    }
}
