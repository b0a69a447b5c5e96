#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use mtss_explorer::{frame::Frame, provider::CsvSources};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// CLI flags pointing every source at the bundled fixtures.
pub fn fixture_source_args() -> Vec<String> {
    [
        ("--roster", "roster.csv"),
        ("--events", "events.csv"),
        ("--grades-primary", "grades_primary.csv"),
        ("--grades-secondary", "grades_secondary.tsv"),
    ]
    .into_iter()
    .flat_map(|(flag, name)| {
        [
            flag.to_string(),
            fixture_path(name).to_string_lossy().into_owned(),
        ]
    })
    .collect()
}

/// Provider reading the bundled fixtures.
pub fn fixture_sources() -> CsvSources {
    CsvSources {
        roster: Some(fixture_path("roster.csv")),
        events: Some(fixture_path("events.csv")),
        grades_primary: Some(fixture_path("grades_primary.csv")),
        grades_secondary: Some(fixture_path("grades_secondary.tsv")),
        ..CsvSources::default()
    }
}

/// Builds an in-memory table from string literals.
pub fn frame(headers: &[&str], rows: &[&[&str]]) -> Frame {
    Frame::from_records(
        headers.iter().map(|h| h.to_string()).collect(),
        rows.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}
