//! Column taxonomy inferred from wide-table headers.
//!
//! Headers carry their meaning in naming conventions. [`classify`] runs an
//! ordered list of rules over a single name and returns the first match:
//!
//! 1. assessment with period: `{name} {subject} {YYYY-YYYY} {period} {PL|SS}`
//! 2. assessment without period: `{name} {subject} {YYYY-YYYY} {PL|SS}`
//! 3. grade: `GR_{subject}_{period}`
//! 4. anything else is student information.
//!
//! [`Taxonomy::from_columns`] folds classified names into typed nodes. Node
//! lists and the column lists inside them are kept sorted, so two headers
//! holding the same names in a different order produce equal taxonomies.

use std::{collections::BTreeMap, fmt::Write as _, sync::LazyLock};

use itertools::Itertools;
use log::trace;
use regex::Regex;
use serde::Serialize;

use crate::{config::Config, pivot::ScoreKind};

const ASSESSMENTS_BRANCH: &str = "Assessments";
const GRADES_BRANCH: &str = "Grades";
const STUDENT_INFO_BRANCH: &str = "Student Info";

static ASSESSMENT_WITH_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>.*?)\s(?P<subject>.*?)\s(?P<year>\d{4}-\d{4})\s(?P<period>.*?)\s(?P<kind>PL|SS)$",
    )
    .expect("assessment-with-period pattern compiles")
});

static ASSESSMENT_WITHOUT_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.*?)\s(?P<subject>.*?)\s(?P<year>\d{4}-\d{4})\s(?P<kind>PL|SS)$")
        .expect("assessment pattern compiles")
});

static GRADE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^GR_(?P<subject>[^_]+)_(?P<period>.+)$").expect("grade pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AssessmentKey {
    pub name: String,
    pub subject: String,
    pub year: String,
    /// Empty when the family has no testing period.
    pub period: String,
    pub kind: ScoreKind,
}

impl AssessmentKey {
    /// Rebuilds the wide-table header this key was parsed from.
    pub fn canonical_name(&self) -> String {
        if self.period.is_empty() {
            format!("{} {} {} {}", self.name, self.subject, self.year, self.kind)
        } else {
            format!(
                "{} {} {} {} {}",
                self.name, self.subject, self.year, self.period, self.kind
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GradeKey {
    pub subject: String,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnClass {
    Assessment(AssessmentKey),
    Grade(GradeKey),
    StudentInfo,
}

struct Rule {
    label: &'static str,
    extract: fn(&str) -> Option<ColumnClass>,
}

const RULES: [Rule; 3] = [
    Rule {
        label: "assessment with period",
        extract: assessment_with_period,
    },
    Rule {
        label: "assessment without period",
        extract: assessment_without_period,
    },
    Rule {
        label: "grade",
        extract: grade,
    },
];

fn assessment_with_period(name: &str) -> Option<ColumnClass> {
    let caps = ASSESSMENT_WITH_PERIOD.captures(name)?;
    Some(ColumnClass::Assessment(AssessmentKey {
        name: caps["name"].to_string(),
        subject: caps["subject"].to_string(),
        year: caps["year"].to_string(),
        period: caps["period"].to_string(),
        kind: caps["kind"].parse().ok()?,
    }))
}

fn assessment_without_period(name: &str) -> Option<ColumnClass> {
    let caps = ASSESSMENT_WITHOUT_PERIOD.captures(name)?;
    Some(ColumnClass::Assessment(AssessmentKey {
        name: caps["name"].to_string(),
        subject: caps["subject"].to_string(),
        year: caps["year"].to_string(),
        period: String::new(),
        kind: caps["kind"].parse().ok()?,
    }))
}

fn grade(name: &str) -> Option<ColumnClass> {
    let caps = GRADE.captures(name)?;
    Some(ColumnClass::Grade(GradeKey {
        subject: caps["subject"].to_string(),
        period: caps["period"].to_string(),
    }))
}

/// Classifies one header. Never fails: unrecognised names are student info.
pub fn classify(name: &str) -> ColumnClass {
    RULES
        .iter()
        .find_map(|rule| {
            let class = (rule.extract)(name)?;
            trace!("'{name}' matched the {} rule", rule.label);
            Some(class)
        })
        .unwrap_or(ColumnClass::StudentInfo)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentNode {
    pub key: AssessmentKey,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeNode {
    pub key: GradeKey,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct InfoLeaf {
    pub column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Taxonomy {
    pub assessments: Vec<AssessmentNode>,
    pub grades: Vec<GradeNode>,
    pub student_info: Vec<InfoLeaf>,
}

type Leaves = Vec<String>;
type ByKind = BTreeMap<String, Leaves>;
type ByPeriod = BTreeMap<String, ByKind>;
type ByYear = BTreeMap<String, ByPeriod>;
type BySubject = BTreeMap<String, ByYear>;

/// Serialised form of a [`Taxonomy`], keyed the way headers are spelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NestedTaxonomy {
    #[serde(rename = "Assessments")]
    pub assessments: BTreeMap<String, BySubject>,
    #[serde(rename = "Grades")]
    pub grades: BTreeMap<String, BTreeMap<String, Leaves>>,
    #[serde(rename = "Student Info")]
    pub student_info: Leaves,
}

#[derive(Default)]
struct Accumulator {
    assessments: BTreeMap<AssessmentKey, Vec<String>>,
    grades: BTreeMap<GradeKey, Vec<String>>,
    student_info: Vec<String>,
}

impl Taxonomy {
    pub fn from_columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let acc = names
            .into_iter()
            .fold(Accumulator::default(), |mut acc, name| {
                let name = name.as_ref();
                match classify(name) {
                    ColumnClass::Assessment(key) => {
                        acc.assessments.entry(key).or_default().push(name.to_string())
                    }
                    ColumnClass::Grade(key) => {
                        acc.grades.entry(key).or_default().push(name.to_string())
                    }
                    ColumnClass::StudentInfo => acc.student_info.push(name.to_string()),
                }
                acc
            });

        Self {
            assessments: acc
                .assessments
                .into_iter()
                .map(|(key, columns)| AssessmentNode {
                    key,
                    columns: columns.into_iter().sorted().collect(),
                })
                .collect(),
            grades: acc
                .grades
                .into_iter()
                .map(|(key, columns)| GradeNode {
                    key,
                    columns: columns.into_iter().sorted().collect(),
                })
                .collect(),
            student_info: acc
                .student_info
                .into_iter()
                .sorted()
                .map(|column| InfoLeaf { column })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty() && self.grades.is_empty() && self.student_info.is_empty()
    }

    /// Every classified column, each exactly once.
    pub fn all_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.assessments
            .iter()
            .flat_map(|node| node.columns.iter())
            .chain(self.grades.iter().flat_map(|node| node.columns.iter()))
            .chain(self.student_info.iter().map(|leaf| &leaf.column))
            .map(String::as_str)
    }

    /// Assessment nodes grouped by (name, subject, year), the granularity
    /// at which assessments are filtered.
    pub fn assessment_groups(&self) -> BTreeMap<(&str, &str, &str), Vec<&AssessmentNode>> {
        let mut groups: BTreeMap<(&str, &str, &str), Vec<&AssessmentNode>> = BTreeMap::new();
        for node in &self.assessments {
            groups
                .entry((
                    node.key.name.as_str(),
                    node.key.subject.as_str(),
                    node.key.year.as_str(),
                ))
                .or_default()
                .push(node);
        }
        groups
    }

    /// Nested mapping with the three branches:
    /// name → subject → year → period → kind → columns, subject → period →
    /// columns, and a flat student-info list.
    pub fn to_nested(&self) -> NestedTaxonomy {
        let mut nested = NestedTaxonomy::default();
        for node in &self.assessments {
            let key = &node.key;
            nested
                .assessments
                .entry(key.name.clone())
                .or_default()
                .entry(key.subject.clone())
                .or_default()
                .entry(key.year.clone())
                .or_default()
                .entry(key.period.clone())
                .or_default()
                .insert(key.kind.to_string(), node.columns.clone());
        }
        for node in &self.grades {
            nested
                .grades
                .entry(node.key.subject.clone())
                .or_default()
                .insert(node.key.period.clone(), node.columns.clone());
        }
        nested.student_info = self.student_info.iter().map(|l| l.column.clone()).collect();
        nested
    }

    /// Indented outline for terminal output. Periods follow the configured
    /// display order rather than alphabetical order.
    pub fn render_tree(&self, config: &Config) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{ASSESSMENTS_BRANCH}");
        let mut last: Option<(&str, &str, &str)> = None;
        for ((name, subject, year), nodes) in self.assessment_groups() {
            if last.is_none_or(|(n, _, _)| n != name) {
                let _ = writeln!(out, "  {name}");
            }
            if last.is_none_or(|(n, s, _)| n != name || s != subject) {
                let _ = writeln!(out, "    {subject}");
            }
            let _ = writeln!(out, "      {year}");
            let ordered = nodes.into_iter().sorted_by_key(|node| {
                (
                    config.period_rank(&node.key.period),
                    node.key.period.clone(),
                    node.key.kind,
                )
            });
            for node in ordered {
                let label = if node.key.period.is_empty() {
                    node.key.kind.to_string()
                } else {
                    format!("{} {}", node.key.period, node.key.kind)
                };
                let _ = writeln!(out, "        {label}: {}", node.columns.join(", "));
            }
            last = Some((name, subject, year));
        }
        let _ = writeln!(out, "{GRADES_BRANCH}");
        for (subject, nodes) in &self.grades.iter().chunk_by(|node| node.key.subject.clone()) {
            let _ = writeln!(out, "  {subject}");
            let ordered = nodes.sorted_by_key(|node| {
                (config.period_rank(&node.key.period), node.key.period.clone())
            });
            for node in ordered {
                let _ = writeln!(out, "    {}: {}", node.key.period, node.columns.join(", "));
            }
        }
        let _ = writeln!(out, "{STUDENT_INFO_BRANCH}");
        for leaf in &self.student_info {
            let _ = writeln!(out, "  {}", leaf.column);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_branch() {
        assert_eq!(
            classify("IREADY Math 2022-2023 Fall PL"),
            ColumnClass::Assessment(AssessmentKey {
                name: "IREADY".into(),
                subject: "Math".into(),
                year: "2022-2023".into(),
                period: "Fall".into(),
                kind: ScoreKind::PerformanceLevel,
            })
        );
        assert_eq!(
            classify("CAASPP ELA 2023-2024 SS"),
            ColumnClass::Assessment(AssessmentKey {
                name: "CAASPP".into(),
                subject: "ELA".into(),
                year: "2023-2024".into(),
                period: String::new(),
                kind: ScoreKind::ScaleScore,
            })
        );
        assert_eq!(
            classify("GR_English_Q1"),
            ColumnClass::Grade(GradeKey {
                subject: "English".into(),
                period: "Q1".into(),
            })
        );
        assert_eq!(classify("STUDENT_NAME"), ColumnClass::StudentInfo);
    }

    #[test]
    fn malformed_names_fall_through_to_student_info() {
        for name in ["IREADY Math 22-23 PL", "GR_", "GR_Math", "IREADY Math 2022-2023 Fall", ""] {
            assert_eq!(classify(name), ColumnClass::StudentInfo, "{name}");
        }
    }

    #[test]
    fn grade_period_keeps_remaining_underscores() {
        assert_eq!(
            classify("GR_Math_S1_Final"),
            ColumnClass::Grade(GradeKey {
                subject: "Math".into(),
                period: "S1_Final".into(),
            })
        );
    }

    #[test]
    fn canonical_name_round_trips() {
        for name in ["STAR Reading 2021-2022 EOY SS", "ELPAC Overall 2022-2023 PL"] {
            let ColumnClass::Assessment(key) = classify(name) else {
                panic!("{name} should be an assessment");
            };
            assert_eq!(key.canonical_name(), name);
        }
    }

    #[test]
    fn taxonomy_places_each_column_once() {
        let names = [
            "SSID",
            "IREADY Math 2022-2023 Fall PL",
            "IREADY Math 2022-2023 Winter PL",
            "IREADY Math 2022-2023 Fall SS",
            "GR_English_Q1",
            "Grade",
        ];
        let taxonomy = Taxonomy::from_columns(names);
        assert_eq!(taxonomy.assessments.len(), 3);
        assert_eq!(taxonomy.grades.len(), 1);
        assert_eq!(taxonomy.student_info.len(), 2);
        let mut placed: Vec<&str> = taxonomy.all_columns().collect();
        placed.sort();
        let mut expected = names.to_vec();
        expected.sort();
        assert_eq!(placed, expected);
        assert_eq!(taxonomy.assessment_groups().len(), 1);
    }

    #[test]
    fn nested_mapping_has_five_assessment_levels() {
        let taxonomy = Taxonomy::from_columns(["IREADY Math 2022-2023 Fall PL", "CAASPP ELA 2023-2024 PL"]);
        let nested = serde_json::to_value(taxonomy.to_nested()).unwrap();
        assert_eq!(
            nested["Assessments"]["IREADY"]["Math"]["2022-2023"]["Fall"]["PL"],
            json!(["IREADY Math 2022-2023 Fall PL"])
        );
        assert_eq!(
            nested["Assessments"]["CAASPP"]["ELA"]["2023-2024"][""]["PL"],
            json!(["CAASPP ELA 2023-2024 PL"])
        );
        assert_eq!(nested["Student Info"], json!([]));
    }

    #[test]
    fn tree_orders_periods_by_configured_rank() {
        let taxonomy = Taxonomy::from_columns([
            "STAR Math 2023-2024 EOY PL",
            "STAR Math 2023-2024 BOY PL",
            "STAR Math 2023-2024 MOY PL",
        ]);
        let tree = taxonomy.render_tree(&Config::default());
        let boy = tree.find("BOY PL").unwrap();
        let moy = tree.find("MOY PL").unwrap();
        let eoy = tree.find("EOY PL").unwrap();
        assert!(boy < moy && moy < eoy);
    }
}
