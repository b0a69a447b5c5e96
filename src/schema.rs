//! Column typing for in-memory tables.
//!
//! Source tables arrive as text. Each column is sampled once at load time and
//! assigned the narrowest [`ColumnType`] that accepts every non-empty field,
//! so that numeric grade and score columns compare numerically later on.
//! A field only counts as numeric when the parsed number prints back to the
//! same text; identifiers like `00123` or 20-digit ids stay strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
        }
    }

    /// Parses one field according to this type. Empty fields are null; a field
    /// the type cannot hold is kept as text rather than rejected.
    pub fn parse_cell(&self, raw: &str) -> Option<Value> {
        if raw.trim().is_empty() {
            return None;
        }
        match self {
            ColumnType::String => Some(Value::String(raw.to_string())),
            ColumnType::Integer => Some(
                raw.trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .unwrap_or_else(|_| Value::String(raw.to_string())),
            ),
            ColumnType::Float => Some(
                raw.trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or_else(|_| Value::String(raw.to_string())),
            ),
        }
    }

    /// Widens two observed types into one that can hold both.
    pub fn unify(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (Integer, Integer) => Integer,
            (Integer, Float) | (Float, Integer) | (Float, Float) => Float,
            _ => String,
        }
    }

    pub fn of_value(value: &Value) -> ColumnType {
        match value {
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::String(_) => ColumnType::String,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub datatype: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, datatype: ColumnType) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    observed: bool,
}

impl TypeCandidate {
    pub(crate) fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            observed: false,
        }
    }

    pub(crate) fn observe(&mut self, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        self.observed = true;
        match Value::infer(trimmed) {
            Some(Value::Integer(_)) => {}
            Some(Value::Float(_)) => self.possible_integer = false,
            _ => {
                self.possible_integer = false;
                self.possible_float = false;
            }
        }
    }

    pub(crate) fn decide(&self) -> ColumnType {
        if !self.observed {
            ColumnType::String
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else {
            ColumnType::String
        }
    }
}

/// Infers one type per column from row-major raw records.
pub fn infer_column_types(column_count: usize, rows: &[Vec<String>]) -> Vec<ColumnType> {
    let mut candidates = vec![TypeCandidate::new(); column_count];
    for row in rows {
        for (idx, field) in row.iter().enumerate().take(column_count) {
            candidates[idx].observe(field);
        }
    }
    candidates.iter().map(TypeCandidate::decide).collect()
}
