//! Operational error taxonomy. Rejection is a data outcome carried on
//! `Reading.rejected`, never one of these variants — these are the "fatal,
//! abort the stage" class of failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("inconsistent reference data: {0}")]
    Inconsistency(String),
}
