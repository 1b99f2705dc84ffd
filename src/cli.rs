//! Clap-derived command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::pipeline::StageOptions;

#[derive(Debug, Parser)]
#[command(name = "tessclean", version, about = "Photometer CSV ingest and validation pipeline")]
pub struct Cli {
    /// Path to the mutable working store (overrides the config file).
    #[arg(long, global = true)]
    pub working_db: Option<String>,

    /// Path to the read-only reference store (overrides the config file).
    #[arg(long, global = true)]
    pub reference_db: Option<String>,

    /// Path to `tessclean.toml`.
    #[arg(long, global = true, default_value = "tessclean.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Args, Clone, Default)]
pub struct StageArgs {
    /// Restrict the stage to a single photometer name.
    #[arg(long)]
    pub name: Option<String>,

    /// Source CSV file (ingest only).
    #[arg(long)]
    pub csv_file: Option<PathBuf>,

    /// Manual period override in seconds (global-stats only, requires --name).
    #[arg(long)]
    pub period: Option<f64>,

    /// Retained-value tolerance as an integer percent.
    #[arg(long)]
    pub tolerance: Option<u8>,

    /// Dry run: compute but do not write.
    #[arg(long)]
    pub test: bool,

    /// Cap the number of summary rows printed at stage end.
    #[arg(long)]
    pub limit: Option<usize>,
}

impl StageArgs {
    pub fn into_options(self, default_tolerance: u8) -> StageOptions {
        StageOptions {
            name: self.name,
            csv_file: self.csv_file,
            period: self.period,
            tolerance: self.tolerance.unwrap_or(default_tolerance),
            test: self.test,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Ingest(StageArgs),
    Differences(StageArgs),
    Retained(StageArgs),
    DailyStats(StageArgs),
    GlobalStats(StageArgs),
    Daylight(StageArgs),
    Instrument(StageArgs),
    Location(StageArgs),
    MetadataRefresh(StageArgs),
    Flags(StageArgs),
    ReferenceCompare(StageArgs),
    /// Differences, daily-stats, global-stats, retained.
    Stage1(StageArgs),
    /// Metadata-refresh, daylight, instrument, location, flags, reference-compare.
    Stage2(StageArgs),
    /// Ingest, then stage1, then stage2.
    Full(StageArgs),
}

impl Command {
    /// The registry key this variant dispatches to, and its shared args.
    pub fn registry_name(&self) -> &'static str {
        match self {
            Command::Ingest(_) => "ingest",
            Command::Differences(_) => "differences",
            Command::Retained(_) => "retained",
            Command::DailyStats(_) => "daily-stats",
            Command::GlobalStats(_) => "global-stats",
            Command::Daylight(_) => "daylight",
            Command::Instrument(_) => "instrument",
            Command::Location(_) => "location",
            Command::MetadataRefresh(_) => "metadata-refresh",
            Command::Flags(_) => "flags",
            Command::ReferenceCompare(_) => "reference-compare",
            Command::Stage1(_) => "stage1",
            Command::Stage2(_) => "stage2",
            Command::Full(_) => "full",
        }
    }

    pub fn args(self) -> StageArgs {
        match self {
            Command::Ingest(a)
            | Command::Differences(a)
            | Command::Retained(a)
            | Command::DailyStats(a)
            | Command::GlobalStats(a)
            | Command::Daylight(a)
            | Command::Instrument(a)
            | Command::Location(a)
            | Command::MetadataRefresh(a)
            | Command::Flags(a)
            | Command::ReferenceCompare(a)
            | Command::Stage1(a)
            | Command::Stage2(a)
            | Command::Full(a) => a,
        }
    }
}
