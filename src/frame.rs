//! In-memory typed table.
//!
//! A [`Frame`] is a header (ordered [`ColumnMeta`] list) plus row-major cells.
//! A cell is `None` when the value is null. Frames are built once by the
//! refresh pipeline and afterwards only read; every derived subset
//! (projection, row filter) is a fresh copy.

use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    path::Path,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, warn};

use crate::{
    data::{Value, display_cell},
    error::PipelineError,
    io_utils,
    schema::{ColumnMeta, ColumnType, infer_column_types},
};

pub type Row = Vec<Option<Value>>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
}

impl Frame {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a frame from text records, inferring one type per column.
    pub fn from_records(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let types = infer_column_types(headers.len(), &records);
        let columns = headers
            .into_iter()
            .zip(types)
            .map(|(name, datatype)| ColumnMeta { name, datatype })
            .collect::<Vec<_>>();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        record
                            .get(idx)
                            .and_then(|raw| column.datatype.parse_cell(raw))
                    })
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn read_csv(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?;
        let mut records = Vec::new();
        for (row_idx, record) in reader.byte_records().enumerate() {
            let record =
                record.with_context(|| format!("Reading row {} of {path:?}", row_idx + 2))?;
            records.push(io_utils::decode_record(&record, encoding)?);
        }
        debug!(
            "Loaded {} row(s) x {} column(s) from {:?}",
            records.len(),
            headers.len(),
            path
        );
        Ok(Self::from_records(headers, records))
    }

    pub fn write_csv(&self, path: Option<&Path>, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(path, delimiter)?;
        writer
            .write_record(self.columns.iter().map(|c| c.name.as_str()))
            .context("Writing header row")?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|cell| display_cell(cell.as_ref())))
                .context("Writing data row")?;
        }
        writer.flush().context("Flushing CSV output")?;
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_type(&self, idx: usize) -> ColumnType {
        self.columns
            .get(idx)
            .map(|c| c.datatype)
            .unwrap_or(ColumnType::String)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row)?.get(column)?.as_ref()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = Option<&Value>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(idx).and_then(|cell| cell.as_ref()))
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx].name = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn map_headers<F>(&mut self, mut rename: F)
    where
        F: FnMut(&str) -> String,
    {
        for column in &mut self.columns {
            column.name = rename(&column.name);
        }
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            if idx < row.len() {
                row.remove(idx);
            }
        }
        true
    }

    pub(crate) fn set_cell(&mut self, row: usize, column: usize, value: Option<Value>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    pub(crate) fn set_column_type(&mut self, column: usize, datatype: ColumnType) {
        if let Some(meta) = self.columns.get_mut(column) {
            meta.datatype = datatype;
        }
    }

    /// Retypes column `name` as text so its values compare as written.
    /// Join keys go through here before matching rows.
    pub fn text_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            let numeric = row
                .get_mut(idx)
                .and_then(Option::as_mut)
                .filter(|cell| cell.is_numeric());
            if let Some(cell) = numeric {
                *cell = Value::String(cell.as_display());
            }
        }
        self.set_column_type(idx, ColumnType::String);
        true
    }

    /// Replaces every null cell with `value`.
    pub fn fill_nulls(&mut self, value: &Value) {
        for row in &mut self.rows {
            for cell in row.iter_mut().filter(|cell| cell.is_none()) {
                *cell = Some(value.clone());
            }
        }
    }

    /// Zero-row copy that keeps the full header.
    pub fn cleared(&self) -> Frame {
        Frame::new(self.columns.clone())
    }

    /// Copies the rows whose mask entry is `true`.
    pub fn filter_rows(&self, mask: &[bool]) -> Frame {
        let rows = self
            .rows
            .iter()
            .zip(mask.iter())
            .filter(|(_, keep)| **keep)
            .map(|(row, _)| row.clone())
            .collect();
        Frame {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Copies the named columns in the given order; unknown names are skipped.
    pub fn select(&self, names: &[String]) -> Frame {
        let indices = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        let columns = indices.iter().map(|idx| self.columns[*idx].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|idx| row[*idx].clone()).collect())
            .collect();
        Frame { columns, rows }
    }

    /// Row-major text rendering used for terminal tables.
    pub fn display_rows(&self, limit: Option<usize>) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| row.iter().map(|cell| display_cell(cell.as_ref())).collect())
            .collect()
    }

    fn key_index(&self, key: &str, table: &str) -> Result<usize, PipelineError> {
        self.column_index(key).ok_or_else(|| PipelineError::MissingColumn {
            table: table.to_string(),
            column: key.to_string(),
        })
    }

    /// Left join on `key`. Every left row is kept exactly once; the first
    /// right row carrying a key wins and later duplicates are reported.
    pub fn left_join(&self, right: &Frame, key: &str, right_label: &str) -> Result<Frame> {
        let left_key = self.key_index(key, "left")?;
        let right_key = right.key_index(key, right_label)?;
        let lookup = right.key_lookup(right_key, right_label);
        let (columns, right_columns) = joined_columns(&self.columns, &right.columns, right_key);

        let mut joined = Frame::new(columns);
        let mut matched = 0usize;
        for row in &self.rows {
            let mut combined = row.clone();
            let partner = row[left_key]
                .as_ref()
                .and_then(|value| lookup.get(&value.as_display()));
            match partner {
                Some(&right_idx) => {
                    matched += 1;
                    let right_row = &right.rows[right_idx];
                    combined.extend(right_columns.iter().map(|idx| right_row[*idx].clone()));
                }
                None => combined.extend(right_columns.iter().map(|_| None)),
            }
            joined.rows.push(combined);
        }
        debug!(
            "Left join with {right_label}: {} row(s), {} matched",
            joined.rows.len(),
            matched
        );
        Ok(joined)
    }

    /// Full outer join on `key`. The right key column is kept (renamed when
    /// it collides) and its output name is returned alongside the frame.
    pub fn full_join(&self, right: &Frame, key: &str, right_label: &str) -> Result<(Frame, String)> {
        let left_key = self.key_index(key, "left")?;
        let right_key = right.key_index(key, right_label)?;
        let lookup = right.key_lookup(right_key, right_label);

        let mut columns = self.columns.clone();
        let mut seen: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        for column in &right.columns {
            let name = disambiguate(&column.name, &mut seen);
            columns.push(ColumnMeta::new(name, column.datatype));
        }
        let right_key_name = columns[self.columns.len() + right_key].name.clone();

        let mut joined = Frame::new(columns);
        let mut used = vec![false; right.rows.len()];
        for row in &self.rows {
            let mut combined = row.clone();
            let partner = row[left_key]
                .as_ref()
                .and_then(|value| lookup.get(&value.as_display()));
            match partner {
                Some(&right_idx) => {
                    used[right_idx] = true;
                    combined.extend(right.rows[right_idx].iter().cloned());
                }
                None => combined.extend(std::iter::repeat_n(None, right.columns.len())),
            }
            joined.rows.push(combined);
        }
        for (right_idx, right_row) in right.rows.iter().enumerate() {
            if used[right_idx] {
                continue;
            }
            let mut combined: Row = vec![None; self.columns.len()];
            combined.extend(right_row.iter().cloned());
            joined.rows.push(combined);
        }
        Ok((joined, right_key_name))
    }

    fn key_lookup(&self, key_idx: usize, label: &str) -> HashMap<String, usize> {
        let mut lookup: HashMap<String, usize> = HashMap::with_capacity(self.rows.len());
        let mut duplicates = 0usize;
        for (idx, row) in self.rows.iter().enumerate() {
            let Some(value) = row[key_idx].as_ref() else {
                continue;
            };
            match lookup.entry(value.as_display()) {
                Entry::Occupied(_) => duplicates += 1,
                Entry::Vacant(slot) => {
                    slot.insert(idx);
                }
            }
        }
        if duplicates > 0 {
            warn!("{label}: {duplicates} row(s) repeat an earlier key; the first occurrence is used");
        }
        lookup
    }
}

fn joined_columns(
    left: &[ColumnMeta],
    right: &[ColumnMeta],
    right_key: usize,
) -> (Vec<ColumnMeta>, Vec<usize>) {
    let mut columns = left.to_vec();
    let mut seen: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut right_columns = Vec::new();
    for (idx, column) in right.iter().enumerate() {
        if idx == right_key {
            continue;
        }
        let name = disambiguate(&column.name, &mut seen);
        columns.push(ColumnMeta::new(name, column.datatype));
        right_columns.push(idx);
    }
    (columns, right_columns)
}

/// Returns `name`, or `right_{name}_{n}` when `name` is already taken.
pub(crate) fn disambiguate(name: &str, seen: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut counter = 1usize;
    while seen.contains(&candidate) {
        candidate = format!("right_{name}_{counter}");
        counter += 1;
    }
    seen.insert(candidate.clone());
    candidate
}
