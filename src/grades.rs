//! Report-card grade merging.
//!
//! Elementary and secondary schools export grades separately. The two tables
//! are full-outer-joined on the student key, the key is coalesced from
//! whichever side carries it, nulls are replaced with the empty string, and
//! abbreviated subject codes in the headers are expanded
//! (`GR_E_Q1` becomes `GR_English_Q1`).

use log::{debug, warn};

use crate::{config::SubjectCode, data::Value, frame::Frame};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub primary_rows: usize,
    pub secondary_rows: usize,
    pub merged_rows: usize,
    /// Rows whose key is null in both sources after coalescing.
    pub unresolved_keys: usize,
    pub expanded_columns: usize,
}

/// Expands subject codes in a column name. Only whole `_`-delimited tokens
/// are considered, so a code embedded in a longer token is left alone.
pub fn expand_subject_codes(name: &str, codes: &[SubjectCode]) -> String {
    name.split('_')
        .map(|token| {
            codes
                .iter()
                .find(|code| code.code == token)
                .map(|code| code.name.as_str())
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Merges the two grade sources into one table keyed by `key`.
///
/// Returns `None` when neither source is available. A source that lacks the
/// key column cannot be joined and is skipped with a warning.
pub fn merge_grade_sources(
    primary: Option<Frame>,
    secondary: Option<Frame>,
    key: &str,
    codes: &[SubjectCode],
) -> (Option<Frame>, MergeReport) {
    let mut report = MergeReport::default();
    let primary = usable(primary, key, "primary grades");
    let secondary = usable(secondary, key, "secondary grades");
    report.primary_rows = primary.as_ref().map_or(0, Frame::row_count);
    report.secondary_rows = secondary.as_ref().map_or(0, Frame::row_count);

    let mut merged = match (primary, secondary) {
        (None, None) => {
            debug!("No grade sources available");
            return (None, report);
        }
        (Some(only), None) | (None, Some(only)) => only,
        (Some(primary), Some(secondary)) => match coalesce_join(&primary, &secondary, key) {
            Some(frame) => frame,
            None => return (None, report),
        },
    };

    if let Some(key_idx) = merged.column_index(key) {
        report.unresolved_keys = merged
            .column_values(key_idx)
            .filter(|cell| cell.is_none_or(Value::is_empty))
            .count();
    }
    if report.unresolved_keys > 0 {
        warn!(
            "{} grade row(s) have no student key in either source",
            report.unresolved_keys
        );
    }
    merged.fill_nulls(&Value::empty());

    merged.map_headers(|name| {
        if name == key {
            return name.to_string();
        }
        let expanded = expand_subject_codes(name, codes);
        if expanded != name {
            report.expanded_columns += 1;
        }
        expanded
    });
    report.merged_rows = merged.row_count();
    debug!(
        "Merged grades: {} + {} row(s) into {}, {} column(s) renamed",
        report.primary_rows, report.secondary_rows, report.merged_rows, report.expanded_columns
    );
    (Some(merged), report)
}

fn usable(frame: Option<Frame>, key: &str, label: &str) -> Option<Frame> {
    let mut frame = frame?;
    if frame.text_column(key) {
        Some(frame)
    } else {
        warn!("The {label} table has no '{key}' column and is ignored");
        None
    }
}

fn coalesce_join(primary: &Frame, secondary: &Frame, key: &str) -> Option<Frame> {
    let (mut joined, right_key) = match primary.full_join(secondary, key, "secondary grades") {
        Ok(result) => result,
        Err(err) => {
            warn!("Could not join grade sources: {err:#}");
            return None;
        }
    };
    let key_idx = joined.column_index(key)?;
    let right_idx = joined.column_index(&right_key)?;
    for row in 0..joined.row_count() {
        if joined.cell(row, key_idx).is_none() {
            let substitute = joined.cell(row, right_idx).cloned();
            joined.set_cell(row, key_idx, substitute);
        }
    }
    let unified = primary
        .column_type(key_idx)
        .unify(secondary.column_type(secondary.column_index(key)?));
    joined.set_column_type(key_idx, unified);
    joined.drop_column(&right_key);
    Some(joined)
}
