//! Per-photometer median of daily medians.

use anyhow::Result;

use crate::models::{GlobalStat, GlobalStatsMethod};
use crate::pipeline::{Pipeline, StageOptions};
use crate::stats;

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    let manual_period = opts.period;
    pipeline.with_run_log("global_stats", opts, move |pipeline| {
        if let (Some(name), Some(period)) = (name_filter.as_deref(), manual_period) {
            set_manual(pipeline, name, period)
        } else {
            compute_automatic(pipeline, name_filter.as_deref())
        }
    })
}

fn compute_automatic(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let names = pipeline.working.names_with_daily_stats(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    for name in names {
        let medians = pipeline.working.daily_medians_for_name(&name)?;
        rows_examined += medians.len() as i64;
        if medians.is_empty() {
            continue;
        }
        pipeline.working.upsert_global_stat(&GlobalStat {
            name: name.clone(),
            median: stats::median(&medians),
            n: medians.len() as i64,
            method: GlobalStatsMethod::Automatic,
        })?;
        rows_changed += 1;
    }

    Ok((rows_examined, rows_changed))
}

/// Operator override: `--name NAME --period SECONDS` records a manual
/// global stat with `N = 0`.
fn set_manual(pipeline: &mut Pipeline, name: &str, period: f64) -> Result<(i64, i64)> {
    pipeline.working.upsert_global_stat(&GlobalStat {
        name: name.to_string(),
        median: period,
        n: 0,
        method: GlobalStatsMethod::Manual,
    })?;
    Ok((1, 1))
}
