//! Daylight run detection over a sliding 7-reading window.

use anyhow::Result;

use crate::models::Rejected;
use crate::pipeline::{Pipeline, StageOptions};

const WINDOW: usize = 7;
const MIDDLE: usize = 3;

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("daylight", opts, move |pipeline| {
        detect_daylight(pipeline, name_filter.as_deref())
    })
}

fn detect_daylight(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let batch_size = pipeline.config.pipeline.batch_size_bulk;
    let names = pipeline.working.distinct_names(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;
    let mut pending: Vec<(String, i32, i32)> = Vec::with_capacity(batch_size);

    for name in names {
        let readings = pipeline.working.accepted_readings_for_name(&name)?;
        rows_examined += readings.len() as i64;
        if readings.len() < WINDOW {
            continue;
        }

        for window in readings.windows(WINDOW) {
            // Constant first difference (Σ|Δ²seq| = 0): every adjacent step
            // in the window is the same size, whatever that size is — not
            // necessarily 1.
            let deltas: Vec<i64> = window
                .windows(2)
                .map(|pair| pair[1].sequence_number - pair[0].sequence_number)
                .collect();
            let consecutive = deltas.windows(2).all(|d| d[0] == d[1]);
            let all_zero_magnitude = window.iter().all(|r| r.magnitude == 0.0);

            if consecutive && all_zero_magnitude {
                let middle = &window[MIDDLE];
                pending.push((middle.name.clone(), middle.date_id, middle.time_id));
                if pending.len() >= batch_size {
                    rows_changed += pending.len() as i64;
                    flush(pipeline, &mut pending)?;
                }
            }
        }
    }

    let remaining = pending.len() as i64;
    flush(pipeline, &mut pending)?;
    rows_changed += remaining;

    Ok((rows_examined, rows_changed))
}

fn flush(pipeline: &mut Pipeline, pending: &mut Vec<(String, i32, i32)>) -> Result<()> {
    for (name, date_id, time_id) in pending.drain(..) {
        pipeline.working.mark_rejected(&name, date_id, time_id, Rejected::Daylight.code())?;
    }
    Ok(())
}
