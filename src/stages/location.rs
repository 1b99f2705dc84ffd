//! Location resolution. Step A resolves what it can per-reading,
//! writing the sentinel `TEMP_REJECTED_LOCATION_ID` where neither the fast
//! nor the slow path yields an answer; step B walks each name's readings in
//! time order and closes or rejects the resulting gaps.

use anyhow::Result;

use crate::models::{LocationGap, Rejected, TEMP_REJECTED_LOCATION_ID};
use crate::pipeline::{Pipeline, StageOptions};
use crate::time;

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("location", opts, move |pipeline| {
        let (examined_a, changed_a) = resolve_step_a(pipeline, name_filter.as_deref())?;
        let (examined_b, changed_b) = close_gaps_step_b(pipeline, name_filter.as_deref())?;
        Ok((examined_a + examined_b, changed_a + changed_b))
    })
}

fn resolve_step_a(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let readings = pipeline.working.readings_missing_location(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    for reading in readings {
        rows_examined += 1;
        let tess_id = reading
            .tess_id
            .expect("readings_missing_location only returns rows with tess_id set");

        let period = match pipeline.periods.get(&reading.name, reading.date_id) {
            Some(p) => Some(p),
            None => {
                let p = lookup_period(pipeline, &reading.name, reading.date_id)?;
                if let Some(p) = p {
                    pipeline.periods.insert(&reading.name, reading.date_id, p);
                }
                p
            }
        };

        let location_id = resolve_one(pipeline, tess_id, reading.date_id, reading.time_id, period)?;

        pipeline
            .working
            .set_location_id(&reading.name, reading.date_id, reading.time_id, location_id)?;
        rows_changed += 1;
    }

    Ok((rows_examined, rows_changed))
}

fn lookup_period(pipeline: &Pipeline, name: &str, date_id: i32) -> Result<Option<f64>> {
    if let Some(daily) = pipeline.working.daily_stat(name, date_id)? {
        return Ok(Some(daily.median));
    }
    Ok(pipeline.working.global_stat(name)?.map(|g| g.median))
}

fn resolve_one(
    pipeline: &mut Pipeline,
    tess_id: i64,
    date_id: i32,
    time_id: i32,
    period: Option<f64>,
) -> Result<i64> {
    // Fast path: LocationDailyAggregate with same_location = 1.
    if let Some(cached) = pipeline.locations.get(tess_id, date_id) {
        return Ok(cached);
    }
    if let Some((location_id, same_location)) = pipeline.working.location_daily_aggregate(tess_id, date_id)? {
        if same_location {
            pipeline.locations.insert(tess_id, date_id, location_id);
            return Ok(location_id);
        }
    }

    // Slow path: reference readings within ±period/2, restricted to
    // {D-1, D, D+1} for index locality.
    if let Some(period) = period {
        let half = period / 2.0;
        let candidates = pipeline.reference.readings_in_window(tess_id, date_id - 1, date_id + 1)?;
        for candidate in candidates {
            let delta = time::seconds_between(date_id, time_id, candidate.date_id, candidate.time_id)?;
            if delta.unsigned_abs() as f64 <= half {
                return Ok(candidate.location_id);
            }
        }
    }

    Ok(TEMP_REJECTED_LOCATION_ID)
}

fn close_gaps_step_b(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let names = pipeline.working.distinct_names(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    for name in names {
        let readings = pipeline.working.accepted_readings_for_name(&name)?;
        rows_examined += readings.len() as i64;

        let mut idx = 0;
        while idx < readings.len() {
            let r = &readings[idx];
            if r.location_id != Some(TEMP_REJECTED_LOCATION_ID) {
                idx += 1;
                continue;
            }

            // Walk to the end of this sentinel run.
            let gap_start = idx;
            let mut gap_end = idx;
            while gap_end + 1 < readings.len() && readings[gap_end + 1].location_id == Some(TEMP_REJECTED_LOCATION_ID)
            {
                gap_end += 1;
            }

            let start_bound = if gap_start == 0 { None } else { readings[gap_start - 1].location_id };
            let end_bound = if gap_end + 1 >= readings.len() { None } else { readings[gap_end + 1].location_id };

            if let (Some(start_location_id), Some(end_location_id)) = (start_bound, end_bound) {
                if start_location_id == end_location_id {
                    for r in &readings[gap_start..=gap_end] {
                        pipeline.working.set_location_id(&name, r.date_id, r.time_id, start_location_id)?;
                        pipeline.working.clear_rejected(&name, r.date_id, r.time_id)?;
                        rows_changed += 1;
                    }
                } else {
                    let start = &readings[gap_start];
                    let end = &readings[gap_end];
                    for r in &readings[gap_start..=gap_end] {
                        pipeline.working.clear_location_id(&name, r.date_id, r.time_id)?;
                        pipeline.working.mark_rejected(&name, r.date_id, r.time_id, Rejected::AmbiguousLoc.code())?;
                        rows_changed += 1;
                    }
                    let start_site = pipeline
                        .reference
                        .location(start_location_id)?
                        .map(|l| l.site)
                        .unwrap_or_default();
                    let end_site = pipeline
                        .reference
                        .location(end_location_id)?
                        .map(|l| l.site)
                        .unwrap_or_default();
                    pipeline.working.insert_location_gap(&LocationGap {
                        name: name.clone(),
                        start_date_id: start.date_id,
                        start_time_id: start.time_id,
                        start_location_id,
                        end_date_id: end.date_id,
                        end_time_id: end.time_id,
                        end_location_id,
                        readings: (gap_end - gap_start + 1) as i64,
                        start_site,
                        end_site,
                    })?;
                }
            }
            // A gap open at either end of the run (no bounding reading yet)
            // is left with the sentinel for a future invocation to close.

            idx = gap_end + 1;
        }
    }

    Ok((rows_examined, rows_changed))
}
