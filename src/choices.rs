//! Candidate values offered for each filter leaf.

use itertools::Itertools;
use serde::Serialize;

use crate::{
    config::ChoiceLimits,
    data::Value,
    frame::Frame,
    leaves::{Leaf, LeafRegistry},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafChoices {
    pub id: String,
    #[serde(flatten)]
    pub leaf: Leaf,
    pub values: Vec<String>,
}

/// Lists the distinct values each filter leaf can be narrowed to, numbers
/// first in numeric order, then text. Leaves without usable values are left
/// out, as are identifier columns and high-cardinality student-info columns.
pub fn collect_choices(frame: &Frame, registry: &LeafRegistry, limits: &ChoiceLimits) -> Vec<LeafChoices> {
    let headers = frame.headers();
    registry
        .filters()
        .filter_map(|entry| {
            let values = match &entry.leaf {
                Leaf::StudentInfo { column } => {
                    if is_identifier(column, limits) {
                        return None;
                    }
                    let values = distinct(frame, &[column.as_str()], |_| true);
                    if values.len() > limits.max_distinct {
                        return None;
                    }
                    values
                }
                Leaf::Assessment { .. } => distinct(frame, &entry.leaf.physical_columns(&headers), |v| {
                    v.is_numeric() || v.as_display().chars().count() < limits.max_assessment_len
                }),
                Leaf::Grades { .. } => distinct(frame, &entry.leaf.physical_columns(&headers), |v| {
                    v.is_numeric() || v.as_display().chars().count() < limits.max_grade_len
                }),
                Leaf::Column { .. } => return None,
            };
            if values.is_empty() {
                return None;
            }
            Some(LeafChoices {
                id: entry.id.clone(),
                leaf: entry.leaf.clone(),
                values: values.iter().map(Value::as_display).collect(),
            })
        })
        .collect()
}

fn is_identifier(column: &str, limits: &ChoiceLimits) -> bool {
    limits.excluded_info_columns.iter().any(|c| c == column) || column.contains("ID")
}

fn distinct<F>(frame: &Frame, columns: &[&str], keep: F) -> Vec<Value>
where
    F: Fn(&Value) -> bool,
{
    columns
        .iter()
        .filter_map(|name| frame.column_index(name))
        .flat_map(|idx| frame.column_values(idx))
        .flatten()
        .filter(|value| !value.is_empty() && keep(*value))
        .unique_by(|value| value.as_display())
        .cloned()
        .sorted_by(|a, b| a.display_order(b))
        .collect()
}
