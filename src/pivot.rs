//! Long-to-wide reshaping of assessment events.
//!
//! Each distinct (test, subject, school year, test date) tuple becomes two
//! columns, one per [`ScoreKind`], named
//! `"{test} {subject} {year} [{date} ]{PL|SS}"`. The date token is omitted for
//! families that never carry one. Rows follow the roster: a student without
//! events still gets a row whose pivoted cells are all null.

use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    error::PipelineError,
    events::EventRecord,
    frame::{Frame, Row},
    schema::{ColumnMeta, ColumnType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScoreKind {
    #[serde(rename = "PL")]
    PerformanceLevel,
    #[serde(rename = "SS")]
    ScaleScore,
}

impl ScoreKind {
    pub const ALL: [ScoreKind; 2] = [ScoreKind::PerformanceLevel, ScoreKind::ScaleScore];

    pub fn token(&self) -> &'static str {
        match self {
            ScoreKind::PerformanceLevel => "PL",
            ScoreKind::ScaleScore => "SS",
        }
    }

    fn pick<'a>(&self, record: &'a EventRecord) -> Option<&'a Value> {
        match self {
            ScoreKind::PerformanceLevel => record.performance_level.as_ref(),
            ScoreKind::ScaleScore => record.scale_score.as_ref(),
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ScoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "PL" => Ok(ScoreKind::PerformanceLevel),
            "SS" => Ok(ScoreKind::ScaleScore),
            other => Err(anyhow!("Unknown score kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PivotKey {
    pub test: String,
    pub subject: String,
    pub school_year: String,
    pub test_date: Option<String>,
}

impl PivotKey {
    pub fn of(record: &EventRecord) -> Self {
        Self {
            test: record.test.clone(),
            subject: record.subject.clone(),
            school_year: record.school_year.clone(),
            test_date: record
                .test_date
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from),
        }
    }

    pub fn column_name(&self, kind: ScoreKind) -> String {
        match &self.test_date {
            Some(date) => format!(
                "{} {} {} {} {}",
                self.test, self.subject, self.school_year, date, kind
            ),
            None => format!("{} {} {} {}", self.test, self.subject, self.school_year, kind),
        }
    }
}

/// Builds the roster-anchored wide assessment table: the key column followed
/// by every PL column, then every SS column, in order of first appearance.
pub fn pivot_wide(roster: &Frame, key_column: &str, events: &[EventRecord]) -> Result<Frame> {
    let key_idx = roster
        .column_index(key_column)
        .ok_or_else(|| PipelineError::MissingColumn {
            table: "roster".to_string(),
            column: key_column.to_string(),
        })?;

    let mut keys: Vec<PivotKey> = Vec::new();
    let mut key_slots: HashMap<PivotKey, usize> = HashMap::new();
    let mut by_student: HashMap<&str, HashMap<usize, &EventRecord>> = HashMap::new();
    let mut repeated = 0usize;
    for record in events {
        let key = PivotKey::of(record);
        let slot = *key_slots.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            keys.len() - 1
        });
        let cells = by_student.entry(record.student.as_str()).or_default();
        if cells.contains_key(&slot) {
            repeated += 1;
        } else {
            cells.insert(slot, record);
        }
    }
    if repeated > 0 {
        debug!("{repeated} event(s) repeated an existing pivot cell; the first value was kept");
    }

    let mut columns = vec![roster.columns()[key_idx].clone()];
    for kind in ScoreKind::ALL {
        for (slot, key) in keys.iter().enumerate() {
            let datatype = by_student
                .values()
                .filter_map(|cells| cells.get(&slot))
                .filter_map(|record| kind.pick(record))
                .map(ColumnType::of_value)
                .reduce(ColumnType::unify)
                .unwrap_or(ColumnType::String);
            columns.push(ColumnMeta::new(key.column_name(kind), datatype));
        }
    }

    let mut wide = Frame::new(columns);
    let mut anchored = 0usize;
    for row in roster.rows() {
        let student = row[key_idx].as_ref().map(Value::as_display);
        let cells = student.as_deref().and_then(|id| by_student.get(id));
        if cells.is_some() {
            anchored += 1;
        }
        let mut wide_row: Row = Vec::with_capacity(1 + keys.len() * 2);
        wide_row.push(row[key_idx].clone());
        for kind in ScoreKind::ALL {
            for slot in 0..keys.len() {
                let value = cells
                    .and_then(|c| c.get(&slot))
                    .and_then(|record| kind.pick(record))
                    .cloned();
                wide_row.push(value);
            }
        }
        wide.push_row(wide_row);
    }
    let orphaned = by_student.len().saturating_sub(anchored);
    if orphaned > 0 {
        debug!("{orphaned} student(s) with events are not on the roster and were dropped");
    }
    debug!(
        "Pivoted {} event(s) into {} column(s) for {} roster row(s)",
        events.len(),
        keys.len() * 2,
        wide.row_count()
    );
    Ok(wide)
}
