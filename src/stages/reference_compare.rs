//! Reference comparison: the terminal classification step.

use anyhow::Result;

use crate::models::Rejected;
use crate::pipeline::{Pipeline, StageOptions};
use crate::time;

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("reference_compare", opts, move |pipeline| {
        compare_against_reference(pipeline, name_filter.as_deref())
    })
}

fn compare_against_reference(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let ok_batch_size = pipeline.config.pipeline.batch_size_reference_ok;
    let reject_batch_size = pipeline.config.pipeline.batch_size_reference_reject;

    let readings = pipeline.working.readings_ready_for_reference_compare(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    let mut accept_batch: Vec<(String, i32, i32)> = Vec::with_capacity(ok_batch_size);
    let mut reject_batch: Vec<(String, i32, i32, i32)> = Vec::with_capacity(reject_batch_size);

    for reading in readings {
        rows_examined += 1;
        let tess_id = reading.tess_id.expect("reference-compare input always has tess_id");

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
        let Some(period) = period else { continue };
        let half = period / 2.0;

        let candidates = pipeline.reference.readings_in_window(tess_id, reading.date_id - 1, reading.date_id + 1)?;
        let mut matches = Vec::new();
        for candidate in candidates {
            let delta = time::seconds_between(reading.date_id, reading.time_id, candidate.date_id, candidate.time_id)?;
            if delta.unsigned_abs() as f64 <= half {
                matches.push(candidate);
            }
        }

        match matches.len() {
            0 => {
                accept_batch.push((reading.name.clone(), reading.date_id, reading.time_id));
                if accept_batch.len() >= ok_batch_size {
                    rows_changed += accept_batch.len() as i64;
                    pipeline.working.mark_accepted_batch(&accept_batch)?;
                    accept_batch.clear();
                }
            }
            1 => {
                let code = if matches[0].sequence_number == reading.sequence_number {
                    Rejected::Coincident.code()
                } else {
                    Rejected::Shifted.code()
                };
                reject_batch.push((reading.name.clone(), reading.date_id, reading.time_id, code));
                if reject_batch.len() >= reject_batch_size {
                    rows_changed += reject_batch.len() as i64;
                    pipeline.working.mark_rejected_batch(&reject_batch)?;
                    reject_batch.clear();
                }
            }
            _ => {
                reject_batch.push((reading.name.clone(), reading.date_id, reading.time_id, Rejected::AmbiguousTime.code()));
                if reject_batch.len() >= reject_batch_size {
                    rows_changed += reject_batch.len() as i64;
                    pipeline.working.mark_rejected_batch(&reject_batch)?;
                    reject_batch.clear();
                }
            }
        }
    }

    if !accept_batch.is_empty() {
        rows_changed += accept_batch.len() as i64;
        pipeline.working.mark_accepted_batch(&accept_batch)?;
    }
    if !reject_batch.is_empty() {
        rows_changed += reject_batch.len() as i64;
        pipeline.working.mark_rejected_batch(&reject_batch)?;
    }

    Ok((rows_examined, rows_changed))
}

fn lookup_period(pipeline: &Pipeline, name: &str, date_id: i32) -> Result<Option<f64>> {
    if let Some(daily) = pipeline.working.daily_stat(name, date_id)? {
        return Ok(Some(daily.median));
    }
    Ok(pipeline.working.global_stat(name)?.map(|g| g.median))
}
