mod common;

use tessclean::models::Rejected;
use tessclean::pipeline::StageOptions;
use tessclean::stages;

fn opts() -> StageOptions {
    StageOptions {
        tolerance: 10,
        ..Default::default()
    }
}

#[test]
fn scenario_s1_two_readings_one_difference() {
    let dir = tempfile::tempdir().unwrap();
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(&dir, "reference.db");
    let mut pipeline = common::open_pipeline(&working_db, &reference_db);

    let csv = common::write_csv(
        &dir,
        "in.csv",
        "2024-01-01T00:00:00Z;stars1;100;745.0;1.0;18.0;12.0;-80\n\
         2024-01-01T00:00:15Z;stars1;101;745.0;1.0;18.0;12.0;-80\n",
    );

    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv);
    stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    stages::stage1(&mut pipeline, &opts()).unwrap();

    let diffs = pipeline.working.difference_groups(None).unwrap();
    assert_eq!(diffs, vec![("stars1".to_string(), 20240101)]);
    let delta_ts = pipeline.working.delta_ts_for_group("stars1", 20240101).unwrap();
    assert_eq!(delta_ts, vec![15.0]);

    let daily = pipeline.working.daily_stat("stars1", 20240101).unwrap().unwrap();
    assert_eq!(daily.n, 1);
    assert_eq!(daily.median, 15.0);

    let global = pipeline.working.global_stat("stars1").unwrap().unwrap();
    assert_eq!(global.median, 15.0);
}

#[test]
fn boundary_single_reading_day_is_marked_single() {
    let dir = tempfile::tempdir().unwrap();
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(&dir, "reference.db");
    let mut pipeline = common::open_pipeline(&working_db, &reference_db);

    let csv = common::write_csv(&dir, "in.csv", "2024-01-01T00:00:00Z;stars1;100;745.0;1.0;18.0;12.0;-80\n");
    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv);
    stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    stages::differences::run(&mut pipeline, &opts()).unwrap();

    let reading = pipeline.working.reading_at("stars1", 20240101, 0).unwrap().unwrap();
    assert_eq!(reading.rejected, Some(Rejected::Single.code()));
    assert!(pipeline.working.difference_groups(None).unwrap().is_empty());
}

#[test]
fn boundary_two_reading_day_is_marked_pair() {
    let dir = tempfile::tempdir().unwrap();
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(&dir, "reference.db");
    let mut pipeline = common::open_pipeline(&working_db, &reference_db);

    let csv = common::write_csv(
        &dir,
        "in.csv",
        "2024-01-01T00:00:00Z;stars1;100;745.0;1.0;18.0;12.0;-80\n\
         2024-01-01T00:05:00Z;stars1;101;745.0;1.0;18.0;12.0;-80\n",
    );
    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv);
    stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    stages::differences::run(&mut pipeline, &opts()).unwrap();

    let r1 = pipeline.working.reading_at("stars1", 20240101, 0).unwrap().unwrap();
    let r2 = pipeline.working.reading_at("stars1", 20240101, 500).unwrap().unwrap();
    assert_eq!(r1.rejected, Some(Rejected::Pair.code()));
    assert_eq!(r2.rejected, Some(Rejected::Pair.code()));
    assert!(pipeline.working.difference_groups(None).unwrap().is_empty());
}

#[test]
fn scenario_s3_repeated_sequence_number_marked_dup() {
    let dir = tempfile::tempdir().unwrap();
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(&dir, "reference.db");
    let mut pipeline = common::open_pipeline(&working_db, &reference_db);

    let csv = common::write_csv(
        &dir,
        "in.csv",
        "2024-01-01T00:00:00Z;stars1;100;745.0;1.0;18.0;12.0;-80\n\
         2024-01-01T00:00:15Z;stars1;101;745.0;1.0;18.0;12.0;-80\n\
         2024-01-01T00:00:16Z;stars1;101;745.0;1.0;18.0;12.0;-80\n",
    );
    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv);
    stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    stages::differences::run(&mut pipeline, &opts()).unwrap();

    let third = pipeline.working.reading_at("stars1", 20240101, 16).unwrap().unwrap();
    assert_eq!(third.rejected, Some(Rejected::DupSeqNumber.code()));

    let delta_ts = pipeline.working.delta_ts_for_group("stars1", 20240101).unwrap();
    assert_eq!(delta_ts, vec![15.0]);
}

#[test]
fn scenario_s6_stale_timestamp_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let working_db = dir.path().join("working.db");
    let reference_db = common::build_reference_store(&dir, "reference.db");
    let mut pipeline = common::open_pipeline(&working_db, &reference_db);

    let csv1 = common::write_csv(&dir, "first.csv", "2024-01-01T00:00:30Z;stars1;100;745.0;1.0;18.0;12.0;-80\n");
    let mut ingest_opts = opts();
    ingest_opts.csv_file = Some(csv1);
    let (_, changed1) = stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    assert_eq!(changed1, 1);

    let counter_before = pipeline.working.get_counter("stars1").unwrap();

    let csv2 = common::write_csv(&dir, "second.csv", "2024-01-01T00:00:15Z;stars1;99;745.0;1.0;18.0;12.0;-80\n");
    ingest_opts.csv_file = Some(csv2);
    let (_, changed2) = stages::ingest::run(&mut pipeline, &ingest_opts).unwrap();
    assert_eq!(changed2, 0);

    let counter_after = pipeline.working.get_counter("stars1").unwrap();
    assert_eq!(counter_before, counter_after);
}
