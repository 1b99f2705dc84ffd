//! Read-only DAO over the reference database. Opened via SQLite's
//! URI read-only mode so a misbehaving stage cannot mutate it by accident —
//! the one exception is `ensure_covering_index`, which briefly reopens
//! read-write once to add an index the original deployment never had.

use anyhow::Result;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::PipelineError;

pub struct ReferenceStore {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceReading {
    pub tess_id: i64,
    pub date_id: i32,
    pub time_id: i32,
    pub sequence_number: i64,
    pub location_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLocation {
    pub location_id: i64,
    pub site: String,
}

impl ReferenceStore {
    /// Opens the reference store file read-only. A missing file surfaces
    /// as `PipelineError::Db`, the "missing store file ⇒ fatal" case.
    pub fn open_read_only(path: &str) -> Result<Self, PipelineError> {
        let uri = format!("file:{path}?mode=ro");
        let conn = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self { conn })
    }

    /// Opens the same file read-write just long enough to add the covering
    /// index the pipeline relies on for its tstamp-window queries.
    /// Safe to call repeatedly: `CREATE INDEX IF NOT EXISTS` is idempotent.
    pub fn ensure_covering_index(path: &str) -> Result<(), PipelineError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tess_readings_lookup
             ON tess_readings_t (tess_id, date_id, time_id, sequence_number, location_id)",
            [],
        )?;
        Ok(())
    }

    /// Resolves `mac → tess_id` through `tess_t`'s validity window, picking
    /// the row whose `[valid_since, valid_until)` covers `tstamp` (an
    /// ISO-8601 string, which sorts lexically the same as chronologically).
    pub fn mac_to_tess_id(&self, mac: &str, tstamp: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .prepare(
                "SELECT tess_id FROM tess_t
                 WHERE mac_address = ?1 AND valid_since <= ?2 AND ?2 < valid_until
                 ORDER BY valid_since DESC LIMIT 1",
            )?
            .query_row(params![mac, tstamp], |r| r.get(0))
            .optional()?)
    }

    /// Resolves `name → mac` through `name_to_mac_t`'s validity window, same
    /// `[valid_since, valid_until)` rule as `mac_to_tess_id`.
    pub fn name_to_mac(&self, name: &str, tstamp: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .prepare(
                "SELECT mac_address FROM name_to_mac_t
                 WHERE name = ?1 AND valid_since <= ?2 AND ?2 < valid_until
                 ORDER BY valid_since DESC LIMIT 1",
            )?
            .query_row(params![name, tstamp], |r| r.get(0))
            .optional()?)
    }

    pub fn tess_exists(&self, tess_id: i64) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM tess_t WHERE tess_id = ?1", params![tess_id], |_| Ok(()))
            .optional()?
            .is_some())
    }

    pub fn location(&self, location_id: i64) -> Result<Option<ReferenceLocation>> {
        Ok(self
            .conn
            .prepare("SELECT location_id, site FROM location_t WHERE location_id = ?1")?
            .query_row(params![location_id], |r| {
                Ok(ReferenceLocation {
                    location_id: r.get(0)?,
                    site: r.get(1)?,
                })
            })
            .optional()?)
    }

    /// Readings for a photometer in a closed `[start, end]` date window,
    /// ordered `(date_id, time_id)`, used by reference comparison.
    pub fn readings_in_window(
        &self,
        tess_id: i64,
        start_date_id: i32,
        end_date_id: i32,
    ) -> Result<Vec<ReferenceReading>> {
        let mut stmt = self.conn.prepare(
            "SELECT tess_id, date_id, time_id, sequence_number, location_id
             FROM tess_readings_t
             WHERE tess_id = ?1 AND date_id BETWEEN ?2 AND ?3
             ORDER BY date_id ASC, time_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tess_id, start_date_id, end_date_id], |r| {
                Ok(ReferenceReading {
                    tess_id: r.get(0)?,
                    date_id: r.get(1)?,
                    time_id: r.get(2)?,
                    sequence_number: r.get(3)?,
                    location_id: r.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One row per `(tess_id, date_id)` with readings in the reference
    /// store: `location_id` is the shared id when every reading for that
    /// device-day agrees, or an arbitrary one of the disagreeing ids
    /// otherwise — callers only use it when `same_location` is true.
    pub fn location_daily_aggregates(&self) -> Result<Vec<(i64, i32, i64, bool)>> {
        let mut stmt = self.conn.prepare(
            "SELECT tess_id, date_id, MIN(location_id),
                    CASE WHEN COUNT(DISTINCT location_id) = 1 THEN 1 ELSE 0 END
             FROM tess_readings_t
             GROUP BY tess_id, date_id",
        )?;
        let rows = stmt
            .query_map([], |r| {
                let same: i32 = r.get(3)?;
                Ok((r.get::<_, i64>(0)?, r.get::<_, i32>(1)?, r.get::<_, i64>(2)?, same != 0))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn reading_at(
        &self,
        tess_id: i64,
        date_id: i32,
        time_id: i32,
    ) -> Result<Option<ReferenceReading>> {
        Ok(self
            .conn
            .prepare(
                "SELECT tess_id, date_id, time_id, sequence_number, location_id
                 FROM tess_readings_t WHERE tess_id = ?1 AND date_id = ?2 AND time_id = ?3",
            )?
            .query_row(params![tess_id, date_id, time_id], |r| {
                Ok(ReferenceReading {
                    tess_id: r.get(0)?,
                    date_id: r.get(1)?,
                    time_id: r.get(2)?,
                    sequence_number: r.get(3)?,
                    location_id: r.get(4)?,
                })
            })
            .optional()?)
    }
}
