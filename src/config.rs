//! Naming conventions of the upstream student-record tables.
//!
//! Every field defaults to the conventions of the district export this tool
//! was built for, so a configuration file is only needed when a source uses
//! different column names or subject codes. The file is YAML:
//!
//! ```yaml
//! key_column: SSID
//! events:
//!   test_date: TEST_DATE
//! subject_codes:
//!   - { code: E, name: English }
//! renames:
//!   ESL: Language
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::DEFAULT_DATE_FORMATS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub key_column: String,
    pub events: EventColumns,
    pub date_formats: Vec<String>,
    pub subject_codes: Vec<SubjectCode>,
    pub renames: BTreeMap<String, String>,
    pub default_columns: Vec<String>,
    pub period_order: Vec<String>,
    pub choices: ChoiceLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventColumns {
    pub student: String,
    pub test: String,
    pub subject: String,
    pub school_year: String,
    pub test_date: String,
    pub performance_level: String,
    pub scale_score: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCode {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceLimits {
    pub max_distinct: usize,
    pub max_assessment_len: usize,
    pub max_grade_len: usize,
    pub excluded_info_columns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_column: "SSID".to_string(),
            events: EventColumns::default(),
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
            subject_codes: [
                ("E", "English"),
                ("M", "Math"),
                ("R", "Reading"),
                ("LW", "LanguageWriting"),
                ("S", "Science"),
                ("SS", "SocialStudies"),
            ]
            .into_iter()
            .map(|(code, name)| SubjectCode {
                code: code.to_string(),
                name: name.to_string(),
            })
            .collect(),
            renames: BTreeMap::from([("ESL".to_string(), "Language".to_string())]),
            default_columns: ["SSID", "STUDENT_NAME", "Grade", "School", "Language", "Race"]
                .into_iter()
                .map(String::from)
                .collect(),
            period_order: ["BOY", "MOY", "EOY", "Fall", "Winter", "Spring"]
                .into_iter()
                .map(String::from)
                .collect(),
            choices: ChoiceLimits::default(),
        }
    }
}

impl Default for EventColumns {
    fn default() -> Self {
        Self {
            student: "SSID".to_string(),
            test: "TEST_NAME".to_string(),
            subject: "SUBJECT".to_string(),
            school_year: "SCHOOL_YEAR".to_string(),
            test_date: "TEST_DATE".to_string(),
            performance_level: "PL".to_string(),
            scale_score: "SS".to_string(),
        }
    }
}

impl Default for ChoiceLimits {
    fn default() -> Self {
        Self {
            max_distinct: 50,
            max_assessment_len: 50,
            max_grade_len: 5,
            excluded_info_columns: vec!["SSID".to_string(), "STUDENT_NAME".to_string()],
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self).context("Serializing config")?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Display rank of a testing period; unknown periods sort after known ones.
    pub fn period_rank(&self, period: &str) -> usize {
        self.period_order
            .iter()
            .position(|p| p == period)
            .unwrap_or(self.period_order.len())
    }
}
