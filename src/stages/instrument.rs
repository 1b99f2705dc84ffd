//! Instrument resolution: `name, tstamp → tess_id` via the
//! reference store's `name_to_mac_t`/`tess_t` validity-window tables.

use anyhow::Result;

use crate::error::PipelineError;
use crate::models::Rejected;
use crate::pipeline::{Pipeline, StageOptions};
use crate::time;

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("instrument", opts, move |pipeline| {
        resolve_instruments(pipeline, name_filter.as_deref())
    })
}

fn resolve_instruments(pipeline: &mut Pipeline, name_filter: Option<&str>) -> Result<(i64, i64)> {
    let readings = pipeline.working.readings_missing_tess(name_filter)?;
    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    for reading in readings {
        rows_examined += 1;
        let tstamp = time::iso8601_from_ids(reading.date_id, reading.time_id);

        let mac = pipeline.reference.name_to_mac(&reading.name, &tstamp)?;
        let Some(mac) = mac else {
            pipeline
                .working
                .mark_rejected(&reading.name, reading.date_id, reading.time_id, Rejected::Before.code())?;
            rows_changed += 1;
            continue;
        };

        let tess_id = pipeline.reference.mac_to_tess_id(&mac, &tstamp)?;
        let Some(tess_id) = tess_id else {
            return Err(PipelineError::Inconsistency(format!(
                "mac {mac} has a valid window at {tstamp} but no tess_t row"
            ))
            .into());
        };

        pipeline.working.set_tess_id(&reading.name, reading.date_id, reading.time_id, tess_id)?;
        rows_changed += 1;
    }

    Ok((rows_examined, rows_changed))
}
