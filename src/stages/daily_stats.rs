//! Per-`(name, date_id)` aggregates over Differences.

use anyhow::Result;

use crate::models::DailyStat;
use crate::pipeline::{Pipeline, StageOptions};
use crate::stats;

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("daily_stats", opts, move |pipeline| {
        compute_daily_stats(pipeline, name_filter.as_deref())
    })
}

fn compute_daily_stats(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let groups = pipeline.working.difference_groups(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    for (name, date_id) in groups {
        let delta_ts = pipeline.working.delta_ts_for_group(&name, date_id)?;
        rows_examined += delta_ts.len() as i64;
        if delta_ts.is_empty() {
            continue;
        }
        let summary = stats::summarize(&delta_ts);
        pipeline.working.upsert_daily_stat(&DailyStat {
            name: name.clone(),
            date_id,
            mean: summary.mean,
            median: summary.median,
            stddev: summary.stddev,
            n: summary.n as i64,
            min: summary.min,
            max: summary.max,
        })?;
        rows_changed += 1;
    }

    Ok((rows_examined, rows_changed))
}
