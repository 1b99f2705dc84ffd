//! Stage implementations plus the static dispatch registry each
//! subcommand resolves through, in place of dynamic subcommand-by-string
//! dispatch.

pub mod daily_stats;
pub mod daylight;
pub mod differences;
pub mod flags;
pub mod global_stats;
pub mod ingest;
pub mod instrument;
pub mod location;
pub mod metadata;
pub mod reference_compare;
pub mod retained;

use anyhow::Result;

use crate::pipeline::{Pipeline, StageOptions};

pub type StageFn = fn(&mut Pipeline, &StageOptions) -> Result<(i64, i64)>;

/// `(subcommand, function)` pairs. Looked up linearly at dispatch time —
/// the table is small and fixed, not hot enough to warrant a `HashMap`.
pub const STAGE_REGISTRY: &[(&str, StageFn)] = &[
    ("ingest", ingest::run),
    ("differences", differences::run),
    ("daily-stats", daily_stats::run),
    ("global-stats", global_stats::run),
    ("retained", retained::run),
    ("metadata-refresh", metadata::run),
    ("daylight", daylight::run),
    ("instrument", instrument::run),
    ("location", location::run),
    ("flags", flags::run),
    ("reference-compare", reference_compare::run),
];

pub fn lookup(name: &str) -> Option<StageFn> {
    STAGE_REGISTRY.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// Stage 1: local cleansing and period estimation.
pub fn stage1(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    run_all(pipeline, opts, &["differences", "daily-stats", "global-stats", "retained"])
}

/// Stage 2: cross-reference enrichment and decision.
pub fn stage2(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    run_all(
        pipeline,
        opts,
        &["metadata-refresh", "daylight", "instrument", "location", "flags", "reference-compare"],
    )
}

/// `full`: ingest, then both stages end to end.
pub fn full(pipeline: &mut Pipeline, opts: &StageOptions) -> Result<(i64, i64)> {
    let (mut examined, mut changed) = ingest::run(pipeline, opts)?;
    let (e1, c1) = stage1(pipeline, opts)?;
    let (e2, c2) = stage2(pipeline, opts)?;
    examined += e1 + e2;
    changed += c1 + c2;
    Ok((examined, changed))
}

fn run_all(pipeline: &mut Pipeline, opts: &StageOptions, names: &[&str]) -> Result<(i64, i64)> {
    let mut examined = 0;
    let mut changed = 0;
    for name in names {
        let f = lookup(name).expect("composite stage names must all resolve in STAGE_REGISTRY");
        let (e, c) = f(pipeline, opts)?;
        examined += e;
        changed += c;
    }
    Ok((examined, changed))
}
