//! Bundles the two stores, the two mandatory caches, and effective config
//! into the single context every stage function receives.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use crate::cache::{LocationCache, PeriodCache};
use crate::config::AppConfig;
use crate::store::{ReferenceStore, WorkingStore};

/// Options common to every stage invocation, set from CLI flags with
/// config-file and built-in fallbacks applied upstream in `cli.rs`.
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub name: Option<String>,
    pub csv_file: Option<PathBuf>,
    pub period: Option<f64>,
    pub tolerance: u8,
    pub test: bool,
    pub limit: Option<usize>,
}

pub struct Pipeline {
    pub working: WorkingStore,
    pub reference: ReferenceStore,
    pub periods: PeriodCache,
    pub locations: LocationCache,
    pub config: AppConfig,
}

impl Pipeline {
    pub fn open(config: AppConfig) -> Result<Self> {
        let working = WorkingStore::open(&config.store.working_db)?;
        ReferenceStore::ensure_covering_index(&config.store.reference_db)?;
        let reference = ReferenceStore::open_read_only(&config.store.reference_db)?;
        Ok(Self {
            working,
            reference,
            periods: PeriodCache::new(),
            locations: LocationCache::new(),
            config,
        })
    }

    /// Wraps a stage closure with `run_log` bookkeeping: opens a run,
    /// invokes `f`, and records success/failure with the row counters it
    /// returns. `f` returns `(rows_examined, rows_changed)` on success.
    pub fn with_run_log(
        &mut self,
        stage: &str,
        opts: &StageOptions,
        f: impl FnOnce(&mut Self) -> Result<(i64, i64)>,
    ) -> Result<(i64, i64)> {
        let run_id = Uuid::new_v4().to_string();
        self.working
            .start_run(&run_id, stage, opts.name.as_deref(), opts.test)?;
        match f(self) {
            Ok((examined, changed)) => {
                self.working.finish_run(&run_id, examined, changed, "ok")?;
                tracing::info!(stage, examined, changed, "stage complete");
                Ok((examined, changed))
            }
            Err(e) => {
                self.working.finish_run(&run_id, 0, 0, "error")?;
                tracing::error!(stage, error = %e, "stage failed");
                Err(e)
            }
        }
    }
}
