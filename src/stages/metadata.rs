//! Metadata refresh (Stage 2 step 1): materializes `LocationDailyAggregate`
//! from the reference store's `tess_readings_t` so location resolution's
//! fast path has something to hit.

use anyhow::Result;

use crate::pipeline::{Pipeline, StageOptions};

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    pipeline.with_run_log("metadata-refresh", opts, refresh)
}

fn refresh(pipeline: &mut Pipeline) -> Result<(i64, i64)> {
    let rows = pipeline.reference.location_daily_aggregates()?;
    let examined = rows.len() as i64;
    pipeline.working.upsert_location_daily_aggregates_batch(&rows)?;
    Ok((examined, examined))
}
