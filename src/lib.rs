//! `tessclean`: a local CLI pipeline that ingests photometer CSV exports and
//! decides which readings may be merged into a reference observational
//! database, via a multi-stage validation pipeline (see `DESIGN.md`).

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod stats;
pub mod store;
pub mod time;
