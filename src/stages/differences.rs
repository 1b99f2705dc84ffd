//! First differences and the SINGLE/PAIR/DUP_SEQ_NUMBER corner cases.

use anyhow::Result;

use crate::models::{Difference, Rejected};
use crate::pipeline::{Pipeline, StageOptions};

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("differences", opts, move |pipeline| {
        compute_differences(pipeline, name_filter.as_deref())
    })
}

fn compute_differences(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let batch_size = pipeline.config.pipeline.batch_size_bulk;
    let groups = pipeline.working.pending_name_date_groups(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;
    let mut batch: Vec<Difference> = Vec::with_capacity(batch_size);

    for (name, date_id, count) in groups {
        let readings = pipeline.working.readings_for_group(&name, date_id)?;
        rows_examined += count;

        if readings.len() == 1 {
            pipeline.working.mark_rejected(&name, date_id, readings[0].time_id, Rejected::Single.code())?;
            rows_changed += 1;
            continue;
        }
        if readings.len() == 2 {
            for r in &readings {
                pipeline.working.mark_rejected(&name, date_id, r.time_id, Rejected::Pair.code())?;
            }
            rows_changed += 2;
            continue;
        }

        for window in readings.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            let delta_seq = cur.sequence_number - prev.sequence_number;
            if delta_seq == 0 {
                pipeline
                    .working
                    .mark_rejected(&name, date_id, cur.time_id, Rejected::DupSeqNumber.code())?;
                rows_changed += 1;
                continue;
            }
            let delta_t = (cur.seconds_in_day - prev.seconds_in_day) as f64;
            let period = delta_t / delta_seq as f64;
            batch.push(Difference {
                name: name.clone(),
                date_id,
                time_id: cur.time_id,
                rank: cur.rank,
                delta_seq,
                delta_t,
                period,
                n: 1,
                control: 0,
                tstamp: cur.tstamp.clone(),
            });
            if batch.len() >= batch_size {
                rows_changed += batch.len() as i64;
                pipeline.working.insert_differences_batch(&batch)?;
                batch.clear();
            }
        }
    }

    if !batch.is_empty() {
        rows_changed += batch.len() as i64;
        pipeline.working.insert_differences_batch(&batch)?;
    }

    Ok((rows_examined, rows_changed))
}
