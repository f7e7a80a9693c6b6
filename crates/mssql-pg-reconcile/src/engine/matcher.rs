//! Row matching over one page pair.
//!
//! Two algorithms, chosen by key presence. Keyed mode aligns rows by their
//! primary key values; keyless mode falls back to a composite identity built
//! from every column the two sides have in common. Pagination windows are
//! independent per side, so with differing row counts a row can land in
//! different windows and be misclassified as Missing plus Extra - an
//! accepted approximation, not corrected by re-windowing.

use crate::core::{values_equal, Row, RowKey, RowPage, SqlValue};
use crate::engine::CancelFlag;
use crate::error::{ReconcileError, Result};
use crate::sink::{MismatchKind, MismatchRecord};
use std::collections::HashMap;

/// Findings from matching one pair of pages.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Rows present in source, absent in target.
    pub missing: i64,
    /// Rows present in target, absent in source.
    pub extra: i64,
    /// Rows present on both sides with at least one differing column.
    pub mismatched_rows: i64,
    /// One record per finding; Mismatch produces one record per column.
    pub records: Vec<MismatchRecord>,
    /// True when a cancellation check fired mid-match.
    pub interrupted: bool,
}

/// Compare two pages of a keyed table.
///
/// Rows are indexed by normalized primary key values. For keys on both sides
/// a content fingerprint short-circuits full comparison; a fingerprint
/// difference alone never produces a record - per-column comparison confirms
/// and names the differing columns.
pub fn match_keyed(
    table: &str,
    key_columns: &[String],
    source: &RowPage,
    target: &RowPage,
    cancel: &CancelFlag,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    let source_index = index_by_key(source, key_columns);
    let target_index = index_by_key(target, key_columns);

    // Fingerprint both rows over the source column set so a pure ordering
    // or case difference cannot skew the hash.
    let cols: Vec<String> = source.columns.as_ref().clone();

    for row in &source.rows {
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return outcome;
        }
        let key = row.key(key_columns);
        match target_index.get(&key) {
            None => {
                outcome.missing += 1;
                outcome.records.push(MismatchRecord::new(
                    table,
                    key,
                    None,
                    row.render(),
                    String::new(),
                    MismatchKind::Missing,
                ));
            }
            Some(target_row) => {
                if row.fingerprint(&cols) == target_row.fingerprint(&cols) {
                    continue;
                }
                if !compare_columns(table, &key, row, target_row, &cols, cancel, &mut outcome) {
                    return outcome;
                }
            }
        }
    }

    for row in &target.rows {
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return outcome;
        }
        let key = row.key(key_columns);
        if !source_index.contains_key(&key) {
            outcome.extra += 1;
            outcome.records.push(MismatchRecord::new(
                table,
                key,
                None,
                String::new(),
                row.render(),
                MismatchKind::Extra,
            ));
        }
    }

    outcome
}

/// Compare two pages of a keyless table using full-row composite keys.
///
/// The key is every common column's normalized value, so two
/// content-identical but logically distinct rows are indistinguishable and
/// treated as interchangeable. Columns outside the intersection are ignored.
pub fn match_keyless(
    table: &str,
    source: &RowPage,
    target: &RowPage,
    cancel: &CancelFlag,
) -> Result<MatchOutcome> {
    let common = common_columns(source, target);
    if common.is_empty() {
        return Err(ReconcileError::NoCommonColumns(table.to_string()));
    }

    let mut outcome = MatchOutcome::default();

    let source_index = index_by_key(source, &common);
    let target_index = index_by_key(target, &common);

    for row in &source.rows {
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return Ok(outcome);
        }
        let key = row.key(&common);
        if !target_index.contains_key(&key) {
            outcome.missing += 1;
            outcome.records.push(MismatchRecord::new(
                table,
                key,
                None,
                row.render(),
                String::new(),
                MismatchKind::Missing,
            ));
        }
    }

    for row in &target.rows {
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return Ok(outcome);
        }
        let key = row.key(&common);
        if !source_index.contains_key(&key) {
            outcome.extra += 1;
            outcome.records.push(MismatchRecord::new(
                table,
                key,
                None,
                String::new(),
                row.render(),
                MismatchKind::Extra,
            ));
        }
    }

    // Keys on both sides already encode full common-column content, but the
    // per-column pass still runs: it catches subset differences when the two
    // column sets are not identical.
    for (key, row) in &source_index {
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return Ok(outcome);
        }
        if let Some(target_row) = target_index.get(key) {
            if !compare_columns(table, key, row, target_row, &common, cancel, &mut outcome) {
                return Ok(outcome);
            }
        }
    }

    Ok(outcome)
}

/// Column names (source spelling) present on both sides, case-insensitive.
/// When one page is empty - a recovered fetch failure - the other side's
/// columns are used so its rows still surface as Missing or Extra.
fn common_columns(source: &RowPage, target: &RowPage) -> Vec<String> {
    if source.columns.is_empty() {
        return target.columns.as_ref().clone();
    }
    if target.columns.is_empty() {
        return source.columns.as_ref().clone();
    }
    let target_lower: Vec<String> = target.column_names_lower();
    let mut common: Vec<String> = source
        .columns
        .iter()
        .filter(|c| target_lower.contains(&c.to_lowercase()))
        .cloned()
        .collect();
    common.sort_by_key(|c| c.to_lowercase());
    common
}

fn index_by_key<'a>(page: &'a RowPage, columns: &[String]) -> HashMap<RowKey, &'a Row> {
    let mut index = HashMap::with_capacity(page.len());
    for row in &page.rows {
        index.insert(row.key(columns), row);
    }
    index
}

/// Per-column comparison of two matched rows. Returns false when cancelled.
fn compare_columns(
    table: &str,
    key: &RowKey,
    source_row: &Row,
    target_row: &Row,
    columns: &[String],
    cancel: &CancelFlag,
    outcome: &mut MatchOutcome,
) -> bool {
    let mut row_mismatched = false;
    for col in columns {
        if cancel.is_cancelled() {
            outcome.interrupted = true;
            return false;
        }
        let source_val = source_row.get_ci(col).cloned().unwrap_or(SqlValue::Null);
        let target_val = target_row.get_ci(col).cloned().unwrap_or(SqlValue::Null);
        if !values_equal(&source_val, &target_val) {
            row_mismatched = true;
            outcome.records.push(MismatchRecord::new(
                table,
                key.clone(),
                Some(col.clone()),
                source_val.display(),
                target_val.display(),
                MismatchKind::Mismatch,
            ));
        }
    }
    if row_mismatched {
        outcome.mismatched_rows += 1;
    }
    true
}
