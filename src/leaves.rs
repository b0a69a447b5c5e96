//! Stable identities for filter and column-selection leaves.
//!
//! A front end and this crate must agree on what to call each addressable
//! unit of the taxonomy without exchanging anything but strings. Ids are
//! built from taxonomy paths with [`sanitize_identifier`]:
//!
//! | leaf | id |
//! |---|---|
//! | student-info filter | `filter_{column}` |
//! | assessment filter | `filter_{name}_{subject}_{year}` |
//! | grades filter | `filter_grades_{subject}_{period}` |
//! | column toggle | `col_{column}` |
//!
//! Sanitizing can map two different paths onto one id. The registry walks
//! leaves in a fixed order and suffixes later duplicates with `_2`, `_3`, ...
//! so every id resolves back to exactly one leaf.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use log::debug;
use serde::Serialize;

use crate::{data::sanitize_identifier, pivot::ScoreKind, taxonomy::Taxonomy};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Leaf {
    StudentInfo { column: String },
    /// Filtered on performance level only.
    Assessment {
        name: String,
        subject: String,
        year: String,
    },
    Grades { subject: String, period: String },
    Column { column: String },
}

impl Leaf {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Leaf::StudentInfo { .. } => "student_info",
            Leaf::Assessment { .. } => "assessment",
            Leaf::Grades { .. } => "grades",
            Leaf::Column { .. } => "column",
        }
    }

    pub fn is_filter(&self) -> bool {
        !matches!(self, Leaf::Column { .. })
    }

    fn base_id(&self) -> String {
        match self {
            Leaf::StudentInfo { column } => format!("filter_{}", sanitize_identifier(column)),
            Leaf::Assessment {
                name,
                subject,
                year,
            } => format!(
                "filter_{}_{}_{}",
                sanitize_identifier(name),
                sanitize_identifier(subject),
                sanitize_identifier(year)
            ),
            Leaf::Grades { subject, period } => format!(
                "filter_grades_{}_{}",
                sanitize_identifier(subject),
                sanitize_identifier(period)
            ),
            Leaf::Column { column } => format!("col_{}", sanitize_identifier(column)),
        }
    }

    /// Physical columns of `headers` this leaf reads, in header order.
    ///
    /// Assessment leaves match every header containing the name, subject,
    /// year and `PL` tokens, so period-qualified and period-less variants of
    /// one assessment are read together. Grades leaves match by prefix.
    pub fn physical_columns<'h>(&self, headers: &'h [String]) -> Vec<&'h str> {
        let matches = |header: &str| match self {
            Leaf::StudentInfo { column } | Leaf::Column { column } => header == column,
            Leaf::Assessment {
                name,
                subject,
                year,
            } => {
                header.contains(name.as_str())
                    && header.contains(subject.as_str())
                    && header.contains(year.as_str())
                    && header.contains(ScoreKind::PerformanceLevel.token())
            }
            Leaf::Grades { subject, period } => {
                header.starts_with(&format!("GR_{subject}_{period}"))
            }
        };
        headers
            .iter()
            .map(String::as_str)
            .filter(|header| matches(header))
            .collect()
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::StudentInfo { column } => write!(f, "student info '{column}'"),
            Leaf::Assessment {
                name,
                subject,
                year,
            } => write!(f, "assessment {name} {subject} {year} PL"),
            Leaf::Grades { subject, period } => write!(f, "grades {subject} {period}"),
            Leaf::Column { column } => write!(f, "column '{column}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafEntry {
    pub id: String,
    #[serde(flatten)]
    pub leaf: Leaf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafRegistry {
    entries: Vec<LeafEntry>,
    by_id: HashMap<String, usize>,
}

impl LeafRegistry {
    /// Derives every leaf of `taxonomy`: student-info filters, assessment
    /// filters, grades filters, then one column toggle per classified column.
    pub fn from_taxonomy(taxonomy: &Taxonomy) -> Self {
        let mut leaves: Vec<Leaf> = Vec::new();
        leaves.extend(taxonomy.student_info.iter().map(|info| Leaf::StudentInfo {
            column: info.column.clone(),
        }));
        leaves.extend(
            taxonomy
                .assessment_groups()
                .into_iter()
                .filter(|(_, nodes)| {
                    nodes
                        .iter()
                        .any(|node| node.key.kind == ScoreKind::PerformanceLevel)
                })
                .map(|((name, subject, year), _)| Leaf::Assessment {
                    name: name.to_string(),
                    subject: subject.to_string(),
                    year: year.to_string(),
                }),
        );
        leaves.extend(taxonomy.grades.iter().map(|node| Leaf::Grades {
            subject: node.key.subject.clone(),
            period: node.key.period.clone(),
        }));
        leaves.extend(taxonomy.all_columns().map(|column| Leaf::Column {
            column: column.to_string(),
        }));
        Self::from_leaves(leaves)
    }

    pub fn from_leaves<I: IntoIterator<Item = Leaf>>(leaves: I) -> Self {
        let mut registry = Self::default();
        let mut taken: HashSet<String> = HashSet::new();
        for leaf in leaves {
            let base = leaf.base_id();
            let mut id = base.clone();
            let mut suffix = 2usize;
            while taken.contains(&id) {
                id = format!("{base}_{suffix}");
                suffix += 1;
            }
            if id != base {
                debug!("Leaf {leaf} shares id '{base}' with an earlier leaf; using '{id}'");
            }
            taken.insert(id.clone());
            registry.by_id.insert(id.clone(), registry.entries.len());
            registry.entries.push(LeafEntry { id, leaf });
        }
        registry
    }

    pub fn get(&self, id: &str) -> Option<&Leaf> {
        self.by_id.get(id).map(|idx| &self.entries[*idx].leaf)
    }

    pub fn id_of(&self, leaf: &Leaf) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| &entry.leaf == leaf)
            .map(|entry| entry.id.as_str())
    }

    pub fn entries(&self) -> &[LeafEntry] {
        &self.entries
    }

    pub fn filters(&self) -> impl Iterator<Item = &LeafEntry> + '_ {
        self.entries.iter().filter(|entry| entry.leaf.is_filter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
