//! Assessment events and latest-record selection.
//!
//! The events table holds one row per test administration. Before pivoting,
//! [`deduplicate_latest`] keeps a single row per
//! (student, test, subject, school year): the one with the most recent test
//! date. Rows whose date is missing or unparseable rank below every dated
//! row; among equally ranked rows the earliest in input order wins.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, warn};

use crate::{
    config::EventColumns,
    data::{Value, display_cell, parse_naive_date},
    error::PipelineError,
    frame::Frame,
    schema::{ColumnMeta, ColumnType},
};

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub student: String,
    pub test: String,
    pub subject: String,
    pub school_year: String,
    /// Raw date token. Some families carry a period label here instead of a
    /// date, and some carry nothing at all.
    pub test_date: Option<String>,
    pub performance_level: Option<Value>,
    pub scale_score: Option<Value>,
}

type GroupKey = (String, String, String, String);

impl EventRecord {
    fn group_key(&self) -> GroupKey {
        (
            self.student.clone(),
            self.test.clone(),
            self.subject.clone(),
            self.school_year.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub input: usize,
    pub groups: usize,
    pub discarded: usize,
    /// Groups whose survivor tied with another row on date (or on having no
    /// date); the earliest row in input order was kept.
    pub ambiguous_ties: usize,
}

/// Extracts event records from a source table. Student, test, subject and
/// school-year columns are required; date and score columns are optional.
pub fn records_from_frame(
    frame: &Frame,
    columns: &EventColumns,
) -> Result<Vec<EventRecord>, PipelineError> {
    let required = |name: &str| {
        frame
            .column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn {
                table: "events".to_string(),
                column: name.to_string(),
            })
    };
    let student_idx = required(&columns.student)?;
    let test_idx = required(&columns.test)?;
    let subject_idx = required(&columns.subject)?;
    let year_idx = required(&columns.school_year)?;
    let date_idx = frame.column_index(&columns.test_date);
    let pl_idx = frame.column_index(&columns.performance_level);
    let ss_idx = frame.column_index(&columns.scale_score);

    let text = |row: usize, idx: usize| display_cell(frame.cell(row, idx));
    let mut records = Vec::with_capacity(frame.row_count());
    let mut skipped = 0usize;
    for row in 0..frame.row_count() {
        let student = text(row, student_idx);
        if student.trim().is_empty() {
            skipped += 1;
            continue;
        }
        records.push(EventRecord {
            student,
            test: text(row, test_idx),
            subject: text(row, subject_idx),
            school_year: text(row, year_idx),
            test_date: date_idx
                .map(|idx| text(row, idx))
                .filter(|raw| !raw.trim().is_empty()),
            performance_level: pl_idx.and_then(|idx| frame.cell(row, idx).cloned()),
            scale_score: ss_idx.and_then(|idx| frame.cell(row, idx).cloned()),
        });
    }
    if skipped > 0 {
        debug!("Skipped {skipped} event row(s) without a student id");
    }
    Ok(records)
}

/// Converts records back into a table using the configured column names.
pub fn records_to_frame(records: &[EventRecord], columns: &EventColumns) -> Frame {
    let score_type = |pick: fn(&EventRecord) -> Option<&Value>| {
        records
            .iter()
            .filter_map(pick)
            .map(ColumnType::of_value)
            .reduce(ColumnType::unify)
            .unwrap_or(ColumnType::String)
    };
    let mut frame = Frame::new(vec![
        ColumnMeta::new(&columns.student, ColumnType::String),
        ColumnMeta::new(&columns.test, ColumnType::String),
        ColumnMeta::new(&columns.subject, ColumnType::String),
        ColumnMeta::new(&columns.school_year, ColumnType::String),
        ColumnMeta::new(&columns.test_date, ColumnType::String),
        ColumnMeta::new(
            &columns.performance_level,
            score_type(|r| r.performance_level.as_ref()),
        ),
        ColumnMeta::new(&columns.scale_score, score_type(|r| r.scale_score.as_ref())),
    ]);
    for record in records {
        frame.push_row(vec![
            Some(Value::String(record.student.clone())),
            Some(Value::String(record.test.clone())),
            Some(Value::String(record.subject.clone())),
            Some(Value::String(record.school_year.clone())),
            record.test_date.clone().map(Value::String),
            record.performance_level.clone(),
            record.scale_score.clone(),
        ]);
    }
    frame
}

/// Keeps the latest record per (student, test, subject, school year).
///
/// Output is ordered by group key, which makes the operation a fixed point:
/// running it on its own output returns the same records in the same order.
pub fn deduplicate_latest<S: AsRef<str>>(
    records: &[EventRecord],
    date_formats: &[S],
) -> (Vec<EventRecord>, DedupReport) {
    let mut groups: BTreeMap<GroupKey, Vec<(usize, Option<NaiveDate>)>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        let parsed = record
            .test_date
            .as_deref()
            .and_then(|raw| parse_naive_date(raw, date_formats));
        groups
            .entry(record.group_key())
            .or_default()
            .push((idx, parsed));
    }

    let mut report = DedupReport {
        input: records.len(),
        groups: groups.len(),
        ..DedupReport::default()
    };
    let mut survivors = Vec::with_capacity(groups.len());
    for members in groups.values() {
        // members are in input order; a later row only wins with a strictly newer date
        let mut best = members[0];
        for candidate in &members[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        if members
            .iter()
            .any(|(idx, date)| *idx != best.0 && *date == best.1)
        {
            report.ambiguous_ties += 1;
        }
        report.discarded += members.len() - 1;
        survivors.push(records[best.0].clone());
    }

    if report.ambiguous_ties > 0 {
        warn!(
            "{} event group(s) had several rows with the same (or no) test date; kept the first in input order",
            report.ambiguous_ties
        );
    }
    debug!(
        "Deduplicated {} event row(s) into {} group(s), {} discarded",
        report.input, report.groups, report.discarded
    );
    (survivors, report)
}
