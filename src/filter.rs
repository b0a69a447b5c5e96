//! Filter composition over the wide table.
//!
//! A [`FilterSpec`] maps leaf ids to chosen values. Each active leaf yields a
//! row mask; values within a leaf are OR-ed, and so are the physical columns a
//! leaf reads. Leaf masks are AND-ed together. With no active leaf every row
//! matches.
//!
//! Nothing here mutates the table: [`apply`] returns a fresh projected copy.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, coerce_choice},
    frame::Frame,
    leaves::{Leaf, LeafRegistry},
    schema::ColumnType,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec {
    selections: BTreeMap<String, Vec<String>>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, leaf_id: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(leaf_id, values);
        self
    }

    pub fn insert<I, S>(&mut self, leaf_id: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selections
            .entry(leaf_id.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Reads a YAML or JSON mapping of leaf id to value list.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("Reading filter file {path:?}"))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing filter file {path:?}"))
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.selections
            .iter()
            .map(|(id, values)| (id.as_str(), values.as_slice()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub total_rows: usize,
    pub matched_rows: usize,
    /// Leaves that constrained the result.
    pub active_leaves: Vec<String>,
    /// Ids in the spec that name no filter leaf.
    pub unknown_leaves: Vec<String>,
    /// Leaves whose columns are absent from the table; they were skipped.
    pub drifted_leaves: Vec<String>,
}

/// Builds the row mask for `spec` over `frame`.
pub fn evaluate(frame: &Frame, registry: &LeafRegistry, spec: &FilterSpec) -> (Vec<bool>, FilterReport) {
    let headers = frame.headers();
    let mut mask = vec![true; frame.row_count()];
    let mut report = FilterReport {
        total_rows: frame.row_count(),
        ..FilterReport::default()
    };

    for (id, values) in spec.iter() {
        let Some(leaf) = registry.get(id).filter(|leaf| leaf.is_filter()) else {
            report.unknown_leaves.push(id.to_string());
            continue;
        };
        let chosen: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
        if chosen.is_empty() {
            continue;
        }
        let columns = leaf
            .physical_columns(&headers)
            .into_iter()
            .filter_map(|name| frame.column_index(name))
            .collect::<Vec<_>>();
        if columns.is_empty() {
            report.drifted_leaves.push(id.to_string());
            continue;
        }
        let matcher = CellMatcher::new(leaf, &chosen);
        for (row, keep) in mask.iter_mut().enumerate() {
            if *keep {
                *keep = columns.iter().any(|&col| {
                    matcher.matches(frame.cell(row, col), &frame.column_type(col))
                });
            }
        }
        report.active_leaves.push(id.to_string());
    }

    report.matched_rows = mask.iter().filter(|keep| **keep).count();
    if !report.unknown_leaves.is_empty() {
        warn!(
            "Ignoring unknown filter id(s): {}",
            report.unknown_leaves.join(", ")
        );
    }
    if !report.drifted_leaves.is_empty() {
        warn!(
            "Filter(s) reference columns missing from the table: {}",
            report.drifted_leaves.join(", ")
        );
    }
    debug!(
        "{} active filter(s) matched {} of {} row(s)",
        report.active_leaves.len(),
        report.matched_rows,
        report.total_rows
    );
    (mask, report)
}

enum CellMatcher<'a> {
    /// Compares the displayed cell text. Numeric cells also accept any choice
    /// naming the same number, so `3.0` selects a cell holding `3`.
    Text(HashSet<&'a str>),
    /// Coerces each choice to the column's type before comparing.
    Typed(&'a [&'a str]),
}

impl<'a> CellMatcher<'a> {
    fn new(leaf: &Leaf, chosen: &'a [&'a str]) -> Self {
        match leaf {
            Leaf::Grades { .. } => CellMatcher::Typed(chosen),
            _ => CellMatcher::Text(chosen.iter().copied().collect()),
        }
    }

    fn matches(&self, cell: Option<&Value>, column_type: &ColumnType) -> bool {
        let Some(cell) = cell else {
            return false;
        };
        match self {
            CellMatcher::Text(set) => {
                set.contains(cell.as_display().as_str())
                    || (cell.is_numeric()
                        && set
                            .iter()
                            .any(|raw| coerce_choice(raw, column_type).loosely_equals(cell)))
            }
            CellMatcher::Typed(choices) => choices
                .iter()
                .any(|raw| coerce_choice(raw, column_type).loosely_equals(cell)),
        }
    }
}

/// Ordered column request: header names and/or `col_` leaf ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    entries: Vec<String>,
}

impl Selection {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maps the request onto live columns. Entries that resolve to nothing are
    /// dropped; repeated columns keep their first position.
    pub fn resolve(&self, frame: &Frame, registry: &LeafRegistry) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = match registry.get(entry) {
                Some(Leaf::Column { column }) => column.as_str(),
                _ => entry.as_str(),
            };
            if !frame.has_column(name) {
                debug!("Selected column '{entry}' is not in the table");
                continue;
            }
            if seen.insert(name) {
                resolved.push(name.to_string());
            }
        }
        resolved
    }
}

/// Filters rows and projects the selected columns. An empty projection
/// yields a zero-row frame that still carries the full header.
pub fn apply(
    frame: &Frame,
    registry: &LeafRegistry,
    spec: &FilterSpec,
    selection: &Selection,
) -> (Frame, FilterReport) {
    let (mask, report) = evaluate(frame, registry, spec);
    let columns = selection.resolve(frame, registry);
    if columns.is_empty() {
        debug!("No selected column is present; returning an empty result");
        return (frame.cleared(), report);
    }
    (frame.filter_rows(&mask).select(&columns), report)
}
