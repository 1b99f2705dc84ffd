mod common;

use tessclean::models::Rejected;
use tessclean::pipeline::{Pipeline, StageOptions};
use tessclean::stages;

fn opts() -> StageOptions {
    StageOptions {
        tolerance: 10,
        ..Default::default()
    }
}

/// Ingests a single reading for `stars1` at `2024-01-01T00:00:00Z`,
/// manually sets its period (bypassing differences/daily-stats, which
/// would otherwise mark a lone reading `SINGLE`), resolves its instrument,
/// sets its location directly, and applies flags — leaving exactly the
/// state reference-compare needs as input.
fn setup_single_accepted_reading(dir: &tempfile::TempDir) -> (Pipeline, std::path::PathBuf) {
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(dir, "reference.db");
    common::register_instrument(&reference_db, "stars1", "AA:BB:CC:DD:EE:FF", 42);
    common::insert_location(&reference_db, 7, "siteA");

    let mut pipeline = common::open_pipeline(&working_db, &reference_db);
    let csv = common::write_csv(dir, "in.csv", "2024-01-01T00:00:00Z;stars1;100;745.0;1.0;18.0;12.0;-80\n");

    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv);
    stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();

    let mut global_opts = opts();
    global_opts.name = Some("stars1".to_string());
    global_opts.period = Some(15.0);
    stages::global_stats::run(&mut pipeline, &global_opts).unwrap();

    stages::instrument::run(&mut pipeline, &opts()).unwrap();
    pipeline.working.set_location_id("stars1", 20240101, 0, 7).unwrap();
    stages::flags::run(&mut pipeline, &opts()).unwrap();

    (pipeline, reference_db)
}

#[test]
fn scenario_s4_no_match_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, _reference_db) = setup_single_accepted_reading(&dir);

    stages::reference_compare::run(&mut pipeline, &opts()).unwrap();

    let reading = pipeline.working.reading_at("stars1", 20240101, 0).unwrap().unwrap();
    assert_eq!(reading.rejected, Some(Rejected::Accepted.code()));
}

#[test]
fn scenario_s4_same_sequence_is_coincident() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, reference_db) = setup_single_accepted_reading(&dir);
    common::insert_reference_reading(&reference_db, 42, 20240101, 3, 100, 7);

    stages::reference_compare::run(&mut pipeline, &opts()).unwrap();

    let reading = pipeline.working.reading_at("stars1", 20240101, 0).unwrap().unwrap();
    assert_eq!(reading.rejected, Some(Rejected::Coincident.code()));
}

#[test]
fn scenario_s4_different_sequence_is_shifted() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, reference_db) = setup_single_accepted_reading(&dir);
    common::insert_reference_reading(&reference_db, 42, 20240101, 3, 999, 7);

    stages::reference_compare::run(&mut pipeline, &opts()).unwrap();

    let reading = pipeline.working.reading_at("stars1", 20240101, 0).unwrap().unwrap();
    assert_eq!(reading.rejected, Some(Rejected::Shifted.code()));
}

#[test]
fn scenario_s4_two_matches_is_ambiguous_time() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, reference_db) = setup_single_accepted_reading(&dir);
    common::insert_reference_reading(&reference_db, 42, 20240101, 2, 100, 7);
    common::insert_reference_reading(&reference_db, 42, 20240101, 5, 999, 7);

    stages::reference_compare::run(&mut pipeline, &opts()).unwrap();

    let reading = pipeline.working.reading_at("stars1", 20240101, 0).unwrap().unwrap();
    assert_eq!(reading.rejected, Some(Rejected::AmbiguousTime.code()));
}

#[test]
fn scenario_s2_daylight_window_marks_middle_readings() {
    let dir = tempfile::tempdir().unwrap();
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(&dir, "reference.db");
    let mut pipeline = common::open_pipeline(&working_db, &reference_db);

    let mut body = String::new();
    for i in 0..10 {
        let second = i * 15;
        body.push_str(&format!(
            "2024-01-01T00:{:02}:{:02}Z;stars1;{};745.0;0.0;18.0;12.0;-80\n",
            second / 60,
            second % 60,
            100 + i
        ));
    }
    let csv = common::write_csv(&dir, "in.csv", &body);
    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv);
    stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    stages::daylight::run(&mut pipeline, &opts()).unwrap();

    // With N=10 and a window of 7, indices 3..=6 (0-based) are the middle
    // readings that every qualifying window covers.
    let marked: Vec<i32> = pipeline
        .working
        .conn()
        .prepare("SELECT time_id FROM readings WHERE rejected = ?1 ORDER BY time_id")
        .unwrap()
        .query_map([Rejected::Daylight.code()], |r| r.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(marked, vec![45, 100, 115, 130]);
}
