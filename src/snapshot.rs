//! Refresh pipeline and the shared, immutable result it produces.
//!
//! [`refresh`] pulls every source once, then deduplicates events, pivots
//! them, merges grades, joins everything onto the roster and derives the
//! taxonomy and leaf ids. The outcome is a [`Snapshot`] that is never
//! mutated afterwards. [`SnapshotStore`] publishes snapshots to concurrent
//! readers: a refresh builds the new snapshot without holding the lock and
//! then swaps a single pointer, so a reader sees either the old snapshot or
//! the new one in full.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::{
    choices::{LeafChoices, collect_choices},
    config::Config,
    error::PipelineError,
    events::{self, DedupReport},
    filter::{self, FilterReport, FilterSpec, Selection},
    frame::Frame,
    grades::{self, MergeReport},
    leaves::LeafRegistry,
    pivot,
    provider::DataProvider,
    taxonomy::Taxonomy,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub roster_rows: usize,
    /// `None` when no events source was available.
    pub dedup: Option<DedupReport>,
    pub grades: MergeReport,
    pub wide_columns: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    generation: u64,
    wide: Frame,
    taxonomy: Taxonomy,
    leaves: LeafRegistry,
    report: RefreshReport,
}

impl Snapshot {
    /// Derives taxonomy and leaf ids from an already assembled wide table.
    pub fn from_wide(wide: Frame) -> Self {
        let taxonomy = Taxonomy::from_columns(wide.headers());
        let leaves = LeafRegistry::from_taxonomy(&taxonomy);
        Self {
            generation: 0,
            report: RefreshReport {
                roster_rows: wide.row_count(),
                wide_columns: wide.column_count(),
                ..RefreshReport::default()
            },
            wide,
            taxonomy,
            leaves,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn wide(&self) -> &Frame {
        &self.wide
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn leaves(&self) -> &LeafRegistry {
        &self.leaves
    }

    pub fn report(&self) -> &RefreshReport {
        &self.report
    }

    pub fn evaluate(&self, spec: &FilterSpec) -> (Vec<bool>, FilterReport) {
        filter::evaluate(&self.wide, &self.leaves, spec)
    }

    pub fn apply(&self, spec: &FilterSpec, selection: &Selection) -> (Frame, FilterReport) {
        filter::apply(&self.wide, &self.leaves, spec, selection)
    }

    pub fn choices(&self, config: &Config) -> Vec<LeafChoices> {
        collect_choices(&self.wide, &self.leaves, &config.choices)
    }
}

/// Builds a fresh snapshot from `provider`. Each source is fetched exactly
/// once. Only a missing roster is fatal; other sources degrade to empty.
pub fn refresh(provider: &dyn DataProvider, config: &Config) -> Result<Snapshot> {
    let key = config.key_column.as_str();
    let mut roster = provider
        .fetch_roster()
        .context("Fetching roster")?
        .ok_or(PipelineError::MissingRoster)?;
    if !roster.text_column(key) {
        return Err(PipelineError::MissingColumn {
            table: "roster".to_string(),
            column: key.to_string(),
        }
        .into());
    }
    let events = provider.fetch_events().context("Fetching events")?;
    let grades_primary = provider
        .fetch_grades_primary()
        .context("Fetching primary grades")?;
    let grades_secondary = provider
        .fetch_grades_secondary()
        .context("Fetching secondary grades")?;

    let mut report = RefreshReport {
        roster_rows: roster.row_count(),
        ..RefreshReport::default()
    };

    let records = match events {
        Some(frame) => match events::records_from_frame(&frame, &config.events) {
            Ok(records) => Some(records),
            Err(err) => {
                warn!("Events table skipped: {err}");
                None
            }
        },
        None => None,
    };
    let survivors = match records {
        Some(records) => {
            let (survivors, dedup) = events::deduplicate_latest(&records, &config.date_formats);
            report.dedup = Some(dedup);
            survivors
        }
        None => Vec::new(),
    };
    let assessments = pivot::pivot_wide(&roster, key, &survivors)?;

    let (grades, merge) = grades::merge_grade_sources(
        grades_primary,
        grades_secondary,
        key,
        &config.subject_codes,
    );
    report.grades = merge;

    let mut wide = roster
        .left_join(&assessments, key, "assessments")
        .context("Joining assessments onto roster")?;
    if let Some(grades) = grades {
        wide = wide
            .left_join(&grades, key, "grades")
            .context("Joining grades onto roster")?;
    }
    for (from, to) in &config.renames {
        if wide.has_column(to) {
            if wide.has_column(from) {
                warn!("Not renaming '{from}' to '{to}': '{to}' already exists");
            }
            continue;
        }
        if wide.rename_column(from, to) {
            debug!("Renamed column '{from}' to '{to}'");
        }
    }
    report.wide_columns = wide.column_count();

    let mut snapshot = Snapshot::from_wide(wide);
    snapshot.report = report;
    info!(
        "Built wide table: {} row(s) x {} column(s), {} assessment node(s), {} grade node(s)",
        snapshot.wide.row_count(),
        snapshot.wide.column_count(),
        snapshot.taxonomy.assessments.len(),
        snapshot.taxonomy.grades.len()
    );
    Ok(snapshot)
}

/// Holder of the current snapshot shared between readers.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The snapshot at the time of the call. Later refreshes do not affect it.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Rebuilds from `provider` and publishes the result. On error the
    /// previous snapshot stays current.
    pub fn refresh_from(&self, provider: &dyn DataProvider, config: &Config) -> Result<Arc<Snapshot>> {
        let snapshot = refresh(provider, config)?;
        Ok(self.publish(snapshot))
    }

    pub fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        let mut guard = self.current.write();
        snapshot.generation = guard.generation + 1;
        let published = Arc::new(snapshot);
        *guard = Arc::clone(&published);
        debug!("Published snapshot generation {}", published.generation);
        published
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;
    use crate::{data::Value, provider::StaticTables};

    fn frame(headers: &[&str], rows: &[&[&str]]) -> Frame {
        Frame::from_records(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn tables() -> StaticTables {
        StaticTables {
            roster: Some(frame(
                &["SSID", "STUDENT_NAME", "ESL"],
                &[&["1", "Ana", "EL"], &["2", "Ben", "EO"], &["3", "Cy", "EO"]],
            )),
            events: Some(frame(
                &["SSID", "TEST_NAME", "SUBJECT", "SCHOOL_YEAR", "TEST_DATE", "PL", "SS"],
                &[
                    &["1", "STAR", "Math", "2023-2024", "2023-09-01", "2", "500"],
                    &["1", "STAR", "Math", "2023-2024", "2024-01-10", "3", "540"],
                    &["2", "CAASPP", "ELA", "2022-2023", "", "Met", "2500"],
                ],
            )),
            grades_primary: Some(frame(&["SSID", "GR_E_Q1"], &[&["1", "3"]])),
            grades_secondary: Some(frame(&["SSID", "GR_M_S1"], &[&["2", "B"]])),
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        inner: StaticTables,
        calls: AtomicUsize,
    }

    impl DataProvider for CountingProvider {
        fn fetch_roster(&self) -> Result<Option<Frame>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_roster()
        }
        fn fetch_events(&self) -> Result<Option<Frame>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_events()
        }
        fn fetch_grades_primary(&self) -> Result<Option<Frame>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_grades_primary()
        }
        fn fetch_grades_secondary(&self) -> Result<Option<Frame>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_grades_secondary()
        }
    }

    #[test]
    fn refresh_assembles_roster_anchored_wide_table() {
        let snapshot = refresh(&tables(), &Config::default()).unwrap();
        let wide = snapshot.wide();
        assert_eq!(
            wide.headers(),
            vec![
                "SSID",
                "STUDENT_NAME",
                "Language",
                "STAR Math 2023-2024 2024-01-10 PL",
                "CAASPP ELA 2022-2023 PL",
                "STAR Math 2023-2024 2024-01-10 SS",
                "CAASPP ELA 2022-2023 SS",
                "GR_English_Q1",
                "GR_Math_S1",
            ]
        );
        assert_eq!(wide.row_count(), 3);
        assert_eq!(wide.cell(0, 3), Some(&Value::String("3".into())));
        assert_eq!(wide.cell(2, 3), None);
        assert_eq!(wide.cell(1, 8), Some(&Value::String("B".into())));
        let dedup = snapshot.report().dedup.as_ref().unwrap();
        assert_eq!(dedup.discarded, 1);
        assert_eq!(snapshot.taxonomy().grades.len(), 2);
        assert!(snapshot.leaves().get("filter_STAR_Math_2023_2024").is_some());
    }

    #[test]
    fn refresh_fetches_each_source_once() {
        let provider = CountingProvider {
            inner: tables(),
            ..CountingProvider::default()
        };
        refresh(&provider, &Config::default()).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn missing_roster_is_fatal() {
        let provider = StaticTables {
            roster: None,
            ..tables()
        };
        let err = refresh(&provider, &Config::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingRoster)
        ));
    }

    #[test]
    fn other_sources_are_optional() {
        let provider = StaticTables {
            roster: tables().roster,
            ..StaticTables::default()
        };
        let snapshot = refresh(&provider, &Config::default()).unwrap();
        assert_eq!(snapshot.wide().headers(), vec!["SSID", "STUDENT_NAME", "Language"]);
        assert!(snapshot.report().dedup.is_none());
    }

    #[test]
    fn failed_refresh_keeps_previous_snapshot() {
        let store = SnapshotStore::default();
        let first = store.refresh_from(&tables(), &Config::default()).unwrap();
        assert_eq!(first.generation(), 1);
        let broken = StaticTables::default();
        assert!(store.refresh_from(&broken, &Config::default()).is_err());
        assert!(Arc::ptr_eq(&store.current(), &first));
    }

    #[test]
    fn readers_see_whole_snapshots_during_refresh() {
        let store = SnapshotStore::new(refresh(&tables(), &Config::default()).unwrap());
        let config = Config::default();
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let snapshot = store.current();
                        let columns: usize = snapshot.taxonomy().all_columns().count();
                        assert_eq!(columns, snapshot.wide().column_count());
                        let (mask, _) = snapshot.evaluate(&FilterSpec::new());
                        assert_eq!(mask.len(), snapshot.wide().row_count());
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..10 {
                    store.refresh_from(&tables(), &config).unwrap();
                }
            });
        });
        assert_eq!(store.current().generation(), 10);
    }
}
