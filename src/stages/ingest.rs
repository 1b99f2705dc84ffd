//! CSV streaming ingest with per-photometer rank assignment.

use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Counter, DuplicatedReading, Reading};
use crate::pipeline::{Pipeline, StageOptions};
use crate::time;

/// Photometer names are short alphanumeric tokens (e.g. `stars1`, `tess-042`).
/// A name failing this pattern almost always means the delimiter or column
/// order is wrong upstream, not that this is a legitimately odd name.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap())
}

struct RawRow {
    tstamp: String,
    name: String,
    sequence_number: i64,
    frequency: f64,
    magnitude: f64,
    ambient_temperature: f64,
    sky_temperature: f64,
    signal_strength: Option<i64>,
}

fn parse_row(record: &csv::StringRecord, line_number: i64) -> Option<RawRow> {
    if record.len() < 7 {
        tracing::warn!(line_number, fields = record.len(), "malformed row: too few fields, skipping");
        return None;
    }
    let tstamp = record.get(0)?.to_string();
    let name = record.get(1)?.to_string();
    if !name_pattern().is_match(&name) {
        tracing::warn!(line_number, name, "malformed row: name fails validation, skipping");
        return None;
    }
    let sequence_number = match record.get(2)?.parse() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(line_number, "malformed row: non-numeric sequence number, skipping");
            return None;
        }
    };
    let frequency = record.get(3)?.parse().ok()?;
    let magnitude = record.get(4)?.parse().ok()?;
    let ambient_temperature = record.get(5)?.parse().ok()?;
    let sky_temperature = record.get(6)?.parse().ok()?;
    let signal_strength = record.get(7).and_then(|s| s.parse().ok());
    Some(RawRow {
        tstamp,
        name,
        sequence_number,
        frequency,
        magnitude,
        ambient_temperature,
        sky_temperature,
        signal_strength,
    })
}

/// Ingest one CSV file, returning `(rows_examined, rows_changed)` where
/// `rows_changed` counts successful inserts.
pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let csv_path = opts
        .csv_file
        .as_ref()
        .context("ingest requires --csv-file")?
        .clone();
    let stage = "ingest";
    let name_filter = opts.name.clone();
    let test = opts.test;
    pipeline.with_run_log(stage, opts, move |pipeline| {
        ingest_file(pipeline, &csv_path, name_filter.as_deref(), test)
    })
}

fn ingest_file(
    pipeline: &mut Pipeline,
    csv_path: &Path,
    name_filter: Option<&str>,
    dry_run: bool,
) -> Result<(i64, i64)> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("opening CSV file {}", csv_path.display()))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_reader(std::io::BufReader::new(file));

    let source_file = csv_path.display().to_string();
    let mut counters: std::collections::HashMap<String, (Counter, bool)> = std::collections::HashMap::new();

    let mut rows_examined: i64 = 0;
    let mut rows_inserted: i64 = 0;
    let mut rows_skipped_malformed: i64 = 0;

    for (idx, record) in reader.records().enumerate() {
        let line_number = (idx + 2) as i64; // account for the header line
        rows_examined += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line_number, error = %e, "malformed CSV row, skipping");
                rows_skipped_malformed += 1;
                continue;
            }
        };
        let Some(row) = parse_row(&record, line_number) else {
            rows_skipped_malformed += 1;
            continue;
        };
        if let Some(filter) = name_filter {
            if row.name != filter {
                continue;
            }
        }

        let ts = match time::parse_iso8601(&row.tstamp) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!(line_number, error = %e, "unparseable timestamp, skipping");
                rows_skipped_malformed += 1;
                continue;
            }
        };
        let ids = time::calendar_ids(&ts);
        let seconds_in_day = time::seconds_in_day(&ts);

        let entry = counters
            .entry(row.name.clone())
            .or_insert_with(|| {
                let counter = pipeline.working.get_counter(&row.name).unwrap_or_else(|_| Counter::fresh(&row.name));
                let persisted = counter.max_rank > 0;
                (counter, persisted)
            });
        let (counter, persisted) = entry;

        if !counter.max_tstamp.is_empty() && row.tstamp.as_str() < counter.max_tstamp.as_str() {
            continue; // S6: strictly-older rows are dropped silently
        }

        let candidate_rank = counter.max_rank + 1;
        let reading = Reading {
            rank: candidate_rank,
            name: row.name.clone(),
            date_id: ids.date_id,
            time_id: ids.time_id,
            sequence_number: row.sequence_number,
            frequency: row.frequency,
            magnitude: row.magnitude,
            ambient_temperature: row.ambient_temperature,
            sky_temperature: row.sky_temperature,
            signal_strength: row.signal_strength,
            seconds_in_day,
            tstamp: row.tstamp.clone(),
            line_number,
            rejected: None,
            tess_id: None,
            location_id: None,
            units_id: None,
        };

        if dry_run {
            rows_inserted += 1;
            continue;
        }

        // Advance the high-water mark before attempting the insert, so a
        // same-name row later in this file never reuses `candidate_rank` —
        // roll the advance back below if the insert turns out to collide.
        counter.max_rank = candidate_rank;

        match pipeline.working.try_insert_reading(&reading) {
            Ok(true) => {
                if row.tstamp > counter.max_tstamp {
                    counter.max_tstamp = row.tstamp.clone();
                }
                rows_inserted += 1;
            }
            Ok(false) => {
                // (name, date_id, time_id) collision: this rank was never consumed.
                counter.max_rank -= 1;
                if row.tstamp == counter.max_tstamp && !*persisted {
                    pipeline.working.record_duplicate(&DuplicatedReading {
                        name: row.name.clone(),
                        tstamp: row.tstamp.clone(),
                        sequence_number: row.sequence_number,
                        source_file: source_file.clone(),
                        line_number,
                    })?;
                }
            }
            Err(e) => return Err(e),
        }
    }

    if !dry_run {
        for (counter, _) in counters.into_values() {
            pipeline.working.upsert_counter(&counter)?;
        }
    }

    if rows_skipped_malformed > 0 {
        tracing::warn!(rows_skipped_malformed, "ingest skipped malformed rows");
    }
    tracing::info!(rows_examined, rows_inserted, rows_skipped_malformed, "ingest finished");
    Ok((rows_examined, rows_inserted))
}
