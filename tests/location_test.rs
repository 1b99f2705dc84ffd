mod common;

use tessclean::models::{GlobalStat, GlobalStatsMethod, Reading, Rejected, TEMP_REJECTED_LOCATION_ID};
use tessclean::pipeline::StageOptions;
use tessclean::stages;

const TESS_ID: i64 = 42;
const PERIOD_SECONDS: f64 = 10.0;
const SPACING_SECONDS: i32 = 100;

fn pack_time_id(total_seconds: i32) -> i32 {
    let hour = total_seconds / 3600;
    let minute = (total_seconds % 3600) / 60;
    let second = total_seconds % 60;
    hour * 10000 + minute * 100 + second
}

fn build_scenario(dir: &tempfile::TempDir, end_location_id: i64) -> tessclean::pipeline::Pipeline {
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(dir, "reference.db");
    common::insert_location(&reference_db, 1, "siteA");
    common::insert_location(&reference_db, 2, "siteB");

    let mut pipeline = common::open_pipeline(&working_db, &reference_db);
    pipeline
        .working
        .upsert_global_stat(&GlobalStat {
            name: "stars1".to_string(),
            median: PERIOD_SECONDS,
            n: 0,
            method: GlobalStatsMethod::Manual,
        })
        .unwrap();

    for i in 0..100i64 {
        let time_id = pack_time_id(i as i32 * SPACING_SECONDS);
        let reading = Reading {
            rank: i + 1,
            name: "stars1".to_string(),
            date_id: 20240101,
            time_id,
            sequence_number: 1000 + i,
            frequency: 745.0,
            magnitude: 1.0,
            ambient_temperature: 18.0,
            sky_temperature: 12.0,
            signal_strength: None,
            seconds_in_day: i as i32 * SPACING_SECONDS,
            tstamp: format!("2024-01-01T{:02}:{:02}:{:02}Z", time_id / 10000, (time_id / 100) % 100, time_id % 100),
            line_number: i + 2,
            rejected: None,
            tess_id: None,
            location_id: None,
            units_id: None,
        };
        pipeline.working.try_insert_reading(&reading).unwrap();
        pipeline.working.set_tess_id("stars1", 20240101, time_id, TESS_ID).unwrap();

        if i < 50 {
            common::insert_reference_reading(&reference_db, TESS_ID, 20240101, time_id, 1000 + i, 1);
        } else if i >= 70 {
            common::insert_reference_reading(&reference_db, TESS_ID, 20240101, time_id, 1000 + i, end_location_id);
        }
        // 50..70: no reference row, forcing the sentinel.
    }

    pipeline
}

#[test]
fn scenario_s5_closable_gap_resolves_to_shared_location() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = build_scenario(&dir, 1);

    stages::location::run(&mut pipeline, &StageOptions::default()).unwrap();

    for i in 0..100i64 {
        let time_id = pack_time_id(i as i32 * SPACING_SECONDS);
        let reading = pipeline.working.reading_at("stars1", 20240101, time_id).unwrap().unwrap();
        assert_eq!(reading.location_id, Some(1), "reading {i} should resolve to location 1");
        assert_eq!(reading.rejected, None, "reading {i} should remain accepted");
    }
}

#[test]
fn scenario_s5_ambiguous_gap_is_rejected_with_gap_row() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = build_scenario(&dir, 2);

    stages::location::run(&mut pipeline, &StageOptions::default()).unwrap();

    for i in 0..50i64 {
        let time_id = pack_time_id(i as i32 * SPACING_SECONDS);
        let reading = pipeline.working.reading_at("stars1", 20240101, time_id).unwrap().unwrap();
        assert_eq!(reading.location_id, Some(1));
        assert_eq!(reading.rejected, None);
    }
    for i in 50..70i64 {
        let time_id = pack_time_id(i as i32 * SPACING_SECONDS);
        let reading = pipeline.working.reading_at("stars1", 20240101, time_id).unwrap().unwrap();
        assert_eq!(reading.location_id, None, "ambiguous gap reading {i} must not keep the sentinel");
        assert_ne!(reading.location_id, Some(TEMP_REJECTED_LOCATION_ID));
        assert_eq!(reading.rejected, Some(Rejected::AmbiguousLoc.code()));
    }
    for i in 70..100i64 {
        let time_id = pack_time_id(i as i32 * SPACING_SECONDS);
        let reading = pipeline.working.reading_at("stars1", 20240101, time_id).unwrap().unwrap();
        assert_eq!(reading.location_id, Some(2));
        assert_eq!(reading.rejected, None);
    }

    let gap_count: i64 = pipeline
        .working
        .conn()
        .query_row("SELECT COUNT(*) FROM location_gaps", [], |r| r.get(0))
        .unwrap();
    assert_eq!(gap_count, 1);

    let (readings, start_loc, end_loc): (i64, i64, i64) = pipeline
        .working
        .conn()
        .query_row(
            "SELECT readings, start_location_id, end_location_id FROM location_gaps",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(readings, 20);
    assert_eq!(start_loc, 1);
    assert_eq!(end_loc, 2);
}
