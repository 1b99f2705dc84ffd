//! Retained-value detection.
//!
//! "Previous accepted reading by rank" is looked up through
//! `previous_accepted_reading`, which filters on `rejected IS NULL` and
//! orders by rank — never by arithmetic on `rank - 1`. The arithmetic form
//! is wrong once earlier stages have opened rank gaps by rejecting rows.

use anyhow::Result;

use crate::models::Rejected;
use crate::pipeline::{Pipeline, StageOptions};

pub fn run(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let name_filter = opts.name.clone();
    let tolerance = opts.tolerance;
    pipeline.with_run_log("retained", opts, move |pipeline| {
        detect_retained(pipeline, name_filter.as_deref(), tolerance)
    })
}

fn detect_retained(pipeline: &mut Pipeline, name_filter: Option<&str>, tolerance_percent: u8) -> Result<(i64, i64)> {
    let candidates = pipeline.working.differences_with_sequence_gap(name_filter)?;
    let tolerance = 1.0 + (tolerance_percent as f64 / 100.0);

    let mut rows_examined: i64 = 0;
    let mut rows_changed: i64 = 0;

    for diff in candidates {
        rows_examined += 1;

        let period = match pipeline.periods.get(&diff.name, diff.date_id) {
            Some(p) => p,
            None => {
                let p = lookup_period(pipeline, &diff.name, diff.date_id)?;
                if let Some(p) = p {
                    pipeline.periods.insert(&diff.name, diff.date_id, p);
                }
                match p {
                    Some(p) => p,
                    None => continue, // no period estimate available yet, skip
                }
            }
        };

        if diff.delta_t >= period * tolerance {
            continue;
        }

        let Some(candidate) = pipeline.working.reading_at(&diff.name, diff.date_id, diff.time_id)? else {
            continue;
        };
        let Some(previous) = pipeline.working.previous_accepted_reading(&diff.name, candidate.rank)? else {
            continue;
        };
        // Two-reading lookback; only `previous` feeds the decision below.
        let _previous_of_previous = pipeline.working.previous_accepted_reading(&diff.name, previous.rank)?;

        if candidate.sequence_number == previous.sequence_number {
            // candidate.rank > previous.rank always, so candidate is "the later of the two".
            pipeline
                .working
                .mark_rejected(&candidate.name, candidate.date_id, candidate.time_id, Rejected::DupSeqNumber.code())?;
            rows_changed += 1;
        }
    }

    Ok((rows_examined, rows_changed))
}

/// Retained-value tolerance always comes from GlobalStats, never DailyStats
/// (unlike location resolution's and reference comparison's daily-then-global
/// rule) — a day whose daily median differs from the photometer's global
/// median is the normal case, not a reason to use a different threshold here.
fn lookup_period(pipeline: &Pipeline, name: &str, _date_id: i32) -> Result<Option<f64>> {
    Ok(pipeline.working.global_stat(name)?.map(|g| g.median))
}
