mod common;

use std::sync::Arc;

use encoding_rs::UTF_8;
use mtss_explorer::{
    config::Config,
    data::{Value, display_cell},
    error::PipelineError,
    filter::{FilterSpec, Selection},
    frame::Frame,
    provider::{CsvSources, StaticTables},
    snapshot::{Snapshot, SnapshotStore, refresh},
};

use common::{TestWorkspace, fixture_path, fixture_sources, frame};

fn fixture_snapshot() -> Snapshot {
    refresh(&fixture_sources(), &Config::default()).expect("refresh fixtures")
}

fn column(snapshot: &Snapshot, name: &str) -> Vec<String> {
    let wide = snapshot.wide();
    let idx = wide.column_index(name).expect("column present");
    (0..wide.row_count())
        .map(|row| display_cell(wide.cell(row, idx)))
        .collect()
}

#[test]
fn refresh_assembles_roster_anchored_table() {
    let snapshot = fixture_snapshot();
    assert_eq!(
        snapshot.wide().headers(),
        vec![
            "SSID",
            "STUDENT_NAME",
            "Grade",
            "School",
            "Language",
            "Race",
            "LOCAL_ID",
            "IREADY Math 2022-2023 Fall PL",
            "STAR Reading 2023-2024 2024-01-20 PL",
            "STAR Reading 2023-2024 2023-09-14 PL",
            "CAASPP Math 2022-2023 PL",
            "IREADY Math 2022-2023 Fall SS",
            "STAR Reading 2023-2024 2024-01-20 SS",
            "STAR Reading 2023-2024 2023-09-14 SS",
            "CAASPP Math 2022-2023 SS",
            "GR_English_Q1",
            "GR_Math_Q1",
            "GR_Math_S1",
            "GR_SocialStudies_S1",
        ]
    );
    assert_eq!(snapshot.wide().row_count(), 5);
    assert_eq!(column(&snapshot, "SSID"), ["1001", "1002", "1003", "1004", "1005"]);
}

#[test]
fn refresh_reports_each_stage() {
    let snapshot = fixture_snapshot();
    let report = snapshot.report();
    assert_eq!(report.roster_rows, 5);
    let dedup = report.dedup.as_ref().expect("events were present");
    assert_eq!(dedup.input, 9);
    assert_eq!(dedup.groups, 7);
    assert_eq!(dedup.discarded, 2);
    assert_eq!(dedup.ambiguous_ties, 1);
    assert_eq!(report.grades.primary_rows, 3);
    assert_eq!(report.grades.secondary_rows, 2);
    assert_eq!(report.grades.merged_rows, 5);
    assert_eq!(report.grades.unresolved_keys, 0);
    assert_eq!(report.wide_columns, 19);
}

#[test]
fn latest_event_values_land_in_student_rows() {
    let snapshot = fixture_snapshot();
    assert_eq!(
        column(&snapshot, "IREADY Math 2022-2023 Fall PL"),
        ["3", "2", "", "", ""]
    );
    assert_eq!(
        column(&snapshot, "STAR Reading 2023-2024 2024-01-20 SS"),
        ["402", "", "", "", ""]
    );
    assert_eq!(
        column(&snapshot, "CAASPP Math 2022-2023 PL"),
        ["", "", "", "Standard Met", "Standard Not Met"]
    );
}

#[test]
fn grade_sources_fill_each_other() {
    let snapshot = fixture_snapshot();
    assert_eq!(column(&snapshot, "GR_Math_Q1"), ["4", "3", "4", "", ""]);
    assert_eq!(column(&snapshot, "GR_Math_S1"), ["", "", "", "B", "C+"]);
}

#[test]
fn filters_combine_across_leaves() {
    let snapshot = fixture_snapshot();
    let (mask, report) = snapshot.evaluate(&FilterSpec::new().with("filter_Grade", ["3"]));
    assert_eq!(mask, [true, true, false, false, false]);
    assert_eq!(report.matched_rows, 2);

    let spec = FilterSpec::new()
        .with("filter_Grade", ["3", "4"])
        .with("filter_grades_Math_Q1", ["4"]);
    let (mask, _) = snapshot.evaluate(&spec);
    assert_eq!(mask, [true, false, true, false, false]);

    let (mask, _) = snapshot.evaluate(&FilterSpec::new().with("filter_Language", ["EL"]));
    assert_eq!(mask, [true, false, false, false, false]);
}

#[test]
fn assessment_leaf_reads_every_period_of_a_year() {
    let snapshot = fixture_snapshot();
    let spec = FilterSpec::new().with("filter_STAR_Reading_2023_2024", ["Above", "At"]);
    let (mask, report) = snapshot.evaluate(&spec);
    assert_eq!(mask, [true, false, true, false, false]);
    assert_eq!(report.active_leaves, vec!["filter_STAR_Reading_2023_2024".to_string()]);
}

#[test]
fn letter_grades_match_as_text() {
    let snapshot = fixture_snapshot();
    let (mask, _) = snapshot.evaluate(&FilterSpec::new().with("filter_grades_Math_S1", ["C+"]));
    assert_eq!(mask, [false, false, false, false, true]);
}

#[test]
fn unknown_leaves_are_reported_and_ignored() {
    let snapshot = fixture_snapshot();
    let (mask, report) = snapshot.evaluate(&FilterSpec::new().with("filter_Nope", ["1"]));
    assert!(mask.iter().all(|keep| *keep));
    assert_eq!(report.unknown_leaves, vec!["filter_Nope".to_string()]);
}

#[test]
fn apply_projects_requested_columns_in_order() {
    let snapshot = fixture_snapshot();
    let (result, _) = snapshot.apply(
        &FilterSpec::new().with("filter_School", ["North"]),
        &Selection::new(["col_STUDENT_NAME", "SSID", "STUDENT_NAME", "Missing"]),
    );
    assert_eq!(result.headers(), vec!["STUDENT_NAME", "SSID"]);
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.cell(1, 0), Some(&Value::String("Ben Ito".into())));
}

#[test]
fn choices_cover_filter_leaves() {
    let snapshot = fixture_snapshot();
    let choices = snapshot.choices(&Config::default());
    let values_of = |id: &str| {
        choices
            .iter()
            .find(|choice| choice.id == id)
            .map(|choice| choice.values.clone())
    };
    assert_eq!(values_of("filter_School"), Some(vec!["Central".into(), "North".into(), "South".into()]));
    assert_eq!(values_of("filter_Grade"), Some(vec!["3".into(), "4".into(), "7".into(), "8".into()]));
    assert_eq!(values_of("filter_SSID"), None);
    assert_eq!(values_of("filter_STUDENT_NAME"), None);
    assert_eq!(
        values_of("filter_grades_Math_S1"),
        Some(vec!["B".into(), "C+".into()])
    );
}

#[test]
fn wide_table_reloads_with_identical_leaves() {
    let snapshot = fixture_snapshot();
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("wide.csv");
    snapshot.wide().write_csv(Some(&path), b',').expect("write wide table");

    let reloaded = Snapshot::from_wide(Frame::read_csv(&path, b',', UTF_8).expect("read wide table"));
    assert_eq!(reloaded.leaves(), snapshot.leaves());
    assert_eq!(reloaded.taxonomy(), snapshot.taxonomy());
    let spec = FilterSpec::new().with("filter_IREADY_Math_2022_2023", ["3"]);
    assert_eq!(reloaded.evaluate(&spec).0, snapshot.evaluate(&spec).0);
}

#[test]
fn roster_only_refresh_still_builds() {
    let sources = CsvSources {
        roster: Some(fixture_path("roster.csv")),
        ..CsvSources::default()
    };
    let snapshot = refresh(&sources, &Config::default()).expect("roster alone is enough");
    assert!(snapshot.report().dedup.is_none());
    assert!(snapshot.taxonomy().assessments.is_empty());
    assert!(snapshot.taxonomy().grades.is_empty());
    assert_eq!(snapshot.wide().column_count(), 7);
}

#[test]
fn missing_roster_is_fatal() {
    let sources = CsvSources {
        events: Some(fixture_path("events.csv")),
        ..CsvSources::default()
    };
    let err = refresh(&sources, &Config::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingRoster)
    ));
}

#[test]
fn identifiers_keep_their_written_form() {
    let tables = StaticTables {
        roster: Some(frame(
            &["SSID", "School", "Grade"],
            &[&["00123", "007", "3"], &["12345678901234567890", "8", ""]],
        )),
        grades_primary: Some(frame(&["SSID", "GR_M_Q1"], &[&["00123", "4"]])),
        ..StaticTables::default()
    };
    let snapshot = refresh(&tables, &Config::default()).expect("static refresh");
    assert_eq!(column(&snapshot, "SSID"), ["00123", "12345678901234567890"]);
    assert_eq!(column(&snapshot, "School"), ["007", "8"]);
    assert_eq!(column(&snapshot, "GR_Math_Q1"), ["4", ""]);

    let (mask, _) = snapshot.evaluate(&FilterSpec::new().with("filter_School", ["007"]));
    assert_eq!(mask, [true, false]);
}

#[test]
fn long_numeric_ids_join_to_their_own_grades() {
    let tables = StaticTables {
        roster: Some(frame(
            &["SSID", "Grade"],
            &[&["11111111111111111111", "3"], &["22222222222222222222", "4"]],
        )),
        grades_primary: Some(frame(
            &["SSID", "GR_M_S1"],
            &[&["11111111111111111111", "A"]],
        )),
        ..StaticTables::default()
    };
    let snapshot = refresh(&tables, &Config::default()).expect("static refresh");
    assert_eq!(
        column(&snapshot, "SSID"),
        ["11111111111111111111", "22222222222222222222"]
    );
    assert_eq!(column(&snapshot, "GR_Math_S1"), ["A", ""]);
}

#[test]
fn store_swaps_whole_snapshots() {
    let store = SnapshotStore::new(fixture_snapshot());
    let before = store.current();

    let tables = StaticTables {
        roster: Some(frame(&["SSID", "Grade"], &[&["1", "5"]])),
        ..StaticTables::default()
    };
    let after = store
        .refresh_from(&tables, &Config::default())
        .expect("static refresh");
    assert_eq!(after.generation(), before.generation() + 1);
    assert_eq!(before.wide().row_count(), 5);
    assert_eq!(store.current().wide().row_count(), 1);
    assert!(Arc::ptr_eq(&after, &store.current()));

    let failed = store.refresh_from(&StaticTables::default(), &Config::default());
    assert!(failed.is_err());
    assert!(Arc::ptr_eq(&after, &store.current()));
}
