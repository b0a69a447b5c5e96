//! Data access seam.
//!
//! The refresh pipeline only sees [`DataProvider`]; where the tables come
//! from (CSV exports, a database, fixtures) is the provider's business.
//! Each method is called once per refresh. `Ok(None)` means the source is
//! absent, which is tolerated for everything except the roster.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{frame::Frame, io_utils};

pub trait DataProvider: Send + Sync {
    fn fetch_roster(&self) -> Result<Option<Frame>>;
    fn fetch_events(&self) -> Result<Option<Frame>>;
    fn fetch_grades_primary(&self) -> Result<Option<Frame>>;
    fn fetch_grades_secondary(&self) -> Result<Option<Frame>>;
}

/// Reads each source from a delimited text export.
#[derive(Debug, Clone)]
pub struct CsvSources {
    pub roster: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub grades_primary: Option<PathBuf>,
    pub grades_secondary: Option<PathBuf>,
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for CsvSources {
    fn default() -> Self {
        Self {
            roster: None,
            events: None,
            grades_primary: None,
            grades_secondary: None,
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

impl CsvSources {
    fn read(&self, label: &str, path: Option<&Path>) -> Result<Option<Frame>> {
        let Some(path) = path else {
            debug!("No {label} source configured");
            return Ok(None);
        };
        let delimiter = io_utils::resolve_delimiter(Some(path), self.delimiter);
        let frame = Frame::read_csv(path, delimiter, self.encoding)
            .with_context(|| format!("Loading {label} table from {path:?}"))?;
        Ok(Some(frame))
    }
}

impl DataProvider for CsvSources {
    fn fetch_roster(&self) -> Result<Option<Frame>> {
        self.read("roster", self.roster.as_deref())
    }

    fn fetch_events(&self) -> Result<Option<Frame>> {
        self.read("events", self.events.as_deref())
    }

    fn fetch_grades_primary(&self) -> Result<Option<Frame>> {
        self.read("primary grades", self.grades_primary.as_deref())
    }

    fn fetch_grades_secondary(&self) -> Result<Option<Frame>> {
        self.read("secondary grades", self.grades_secondary.as_deref())
    }
}

/// Serves tables that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticTables {
    pub roster: Option<Frame>,
    pub events: Option<Frame>,
    pub grades_primary: Option<Frame>,
    pub grades_secondary: Option<Frame>,
}

impl DataProvider for StaticTables {
    fn fetch_roster(&self) -> Result<Option<Frame>> {
        Ok(self.roster.clone())
    }

    fn fetch_events(&self) -> Result<Option<Frame>> {
        Ok(self.events.clone())
    }

    fn fetch_grades_primary(&self) -> Result<Option<Frame>> {
        Ok(self.grades_primary.clone())
    }

    fn fetch_grades_secondary(&self) -> Result<Option<Frame>> {
        Ok(self.grades_secondary.clone())
    }
}
