//! The working-store entities described in the data model: readings, the
//! housekeeping counters that make ingest restart-safe, and the derived
//! tables each later stage reads and writes.

use serde::{Deserialize, Serialize};

/// Disjoint rejection classification. `None` on [`Reading::rejected`] means
/// "not yet decided", not "accepted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Rejected {
    ProvAccepted = -1,
    Accepted = 0,
    DupSeqNumber = 1,
    Single = 2,
    Pair = 3,
    Daylight = 4,
    Before = 5,
    AmbiguousLoc = 6,
    Coincident = 7,
    Shifted = 8,
    AmbiguousTime = 9,
}

impl Rejected {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> anyhow::Result<Self> {
        Ok(match code {
            -1 => Rejected::ProvAccepted,
            0 => Rejected::Accepted,
            1 => Rejected::DupSeqNumber,
            2 => Rejected::Single,
            3 => Rejected::Pair,
            4 => Rejected::Daylight,
            5 => Rejected::Before,
            6 => Rejected::AmbiguousLoc,
            7 => Rejected::Coincident,
            8 => Rejected::Shifted,
            9 => Rejected::AmbiguousTime,
            other => anyhow::bail!("unknown rejection code {other}"),
        })
    }

    /// Readings carrying one of these codes are terminal: no later stage
    /// should touch their decision fields again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Rejected::ProvAccepted)
    }
}

/// `FLAGS_SUBSCRIBER_IMPORTED`, stamped on every still-accepted reading by
/// the flags stage.
pub const FLAGS_SUBSCRIBER_IMPORTED: i64 = 2;

/// Sentinel written into `location_id` by location-resolution step A while a
/// reading awaits gap closure (step B). Never observed outside `store::working`.
pub const TEMP_REJECTED_LOCATION_ID: i64 = -100;

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub rank: i64,
    pub name: String,
    pub date_id: i32,
    pub time_id: i32,
    pub sequence_number: i64,
    pub frequency: f64,
    pub magnitude: f64,
    pub ambient_temperature: f64,
    pub sky_temperature: f64,
    pub signal_strength: Option<i64>,
    pub seconds_in_day: i32,
    pub tstamp: String,
    pub line_number: i64,
    pub rejected: Option<i32>,
    pub tess_id: Option<i64>,
    pub location_id: Option<i64>,
    pub units_id: Option<i64>,
}

impl Reading {
    pub fn is_accepted_so_far(&self) -> bool {
        self.rejected.is_none()
    }
}

/// One row per photometer, the high-water mark that makes ingest restart-safe.
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub name: String,
    pub max_rank: i64,
    pub max_tstamp: String,
}

impl Counter {
    pub fn fresh(name: &str) -> Self {
        Self {
            name: name.to_string(),
            max_rank: 0,
            max_tstamp: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub name: String,
    pub date_id: i32,
    pub time_id: i32,
    pub rank: i64,
    pub delta_seq: i64,
    pub delta_t: f64,
    pub period: f64,
    pub n: i64,
    pub control: i32,
    pub tstamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyStat {
    pub name: String,
    pub date_id: i32,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub n: i64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalStatsMethod {
    Automatic,
    Manual,
}

impl GlobalStatsMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalStatsMethod::Automatic => "automatic",
            GlobalStatsMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "manual" => GlobalStatsMethod::Manual,
            _ => GlobalStatsMethod::Automatic,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStat {
    pub name: String,
    pub median: f64,
    pub n: i64,
    pub method: GlobalStatsMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatedReading {
    pub name: String,
    pub tstamp: String,
    pub sequence_number: i64,
    pub source_file: String,
    pub line_number: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationGap {
    pub name: String,
    pub start_date_id: i32,
    pub start_time_id: i32,
    pub start_location_id: i64,
    pub end_date_id: i32,
    pub end_time_id: i32,
    pub end_location_id: i64,
    pub readings: i64,
    pub start_site: String,
    pub end_site: String,
}

/// Audit-trail row for one stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLogEntry {
    pub id: String,
    pub stage: String,
    pub name_filter: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub rows_examined: i64,
    pub rows_changed: i64,
    pub dry_run: bool,
    pub outcome: String,
}
