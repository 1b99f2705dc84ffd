//! Stamp the fixed units/flags value on every still-accepted reading.

use anyhow::Result;

use crate::models::FLAGS_SUBSCRIBER_IMPORTED;
use crate::pipeline::{Pipeline, StageOptions};

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    pipeline.with_run_log("flags", opts, move |pipeline| {
        let changed = pipeline.working.apply_flags(FLAGS_SUBSCRIBER_IMPORTED, name_filter.as_deref())?;
        Ok((changed as i64, changed as i64))
    })
}
