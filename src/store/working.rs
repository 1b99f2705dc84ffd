//! DAO over the mutable working store: a `rusqlite` connection over a
//! single SQLite file, adapted to a synchronous, single-threaded
//! scheduling model — no `Mutex`, no async.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::PipelineError;
use crate::models::{
    Counter, DailyStat, Difference, DuplicatedReading, GlobalStat, GlobalStatsMethod,
    LocationGap, Reading, RunLogEntry,
};

pub struct WorkingStore {
    conn: Connection,
}

impl WorkingStore {
    /// Opens (creating if absent) the working store file. A missing parent
    /// directory or unwritable path surfaces as `PipelineError::Db`.
    pub fn open(path: &str) -> Result<Self, PipelineError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<(), PipelineError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS readings (
                name               TEXT NOT NULL,
                date_id            INTEGER NOT NULL,
                time_id            INTEGER NOT NULL,
                rank               INTEGER NOT NULL,
                sequence_number    INTEGER NOT NULL,
                frequency          REAL NOT NULL,
                magnitude          REAL NOT NULL,
                ambient_temperature REAL NOT NULL,
                sky_temperature    REAL NOT NULL,
                signal_strength    INTEGER,
                seconds_in_day     INTEGER NOT NULL,
                tstamp             TEXT NOT NULL,
                line_number        INTEGER NOT NULL,
                rejected           INTEGER,
                tess_id            INTEGER,
                location_id        INTEGER,
                units_id           INTEGER,
                PRIMARY KEY (name, date_id, time_id)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_readings_rank ON readings(name, rank);
            CREATE INDEX IF NOT EXISTS idx_readings_rejected ON readings(name, rejected, date_id);

            CREATE TABLE IF NOT EXISTS counters (
                name       TEXT PRIMARY KEY,
                max_rank   INTEGER NOT NULL DEFAULT 0,
                max_tstamp TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS duplicated_readings (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                tstamp          TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                source_file     TEXT NOT NULL,
                line_number     INTEGER NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS differences (
                name      TEXT NOT NULL,
                date_id   INTEGER NOT NULL,
                time_id   INTEGER NOT NULL,
                rank      INTEGER NOT NULL,
                delta_seq INTEGER NOT NULL,
                delta_t   REAL NOT NULL,
                period    REAL NOT NULL,
                n         INTEGER NOT NULL,
                control   INTEGER NOT NULL DEFAULT 0,
                tstamp    TEXT NOT NULL,
                PRIMARY KEY (name, date_id, time_id)
            );

            CREATE TABLE IF NOT EXISTS daily_stats (
                name    TEXT NOT NULL,
                date_id INTEGER NOT NULL,
                mean    REAL NOT NULL,
                median  REAL NOT NULL,
                stddev  REAL NOT NULL,
                n       INTEGER NOT NULL,
                min     REAL NOT NULL,
                max     REAL NOT NULL,
                PRIMARY KEY (name, date_id)
            );

            CREATE TABLE IF NOT EXISTS global_stats (
                name   TEXT PRIMARY KEY,
                median REAL NOT NULL,
                n      INTEGER NOT NULL,
                method TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS location_gaps (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                name               TEXT NOT NULL,
                start_date_id      INTEGER NOT NULL,
                start_time_id      INTEGER NOT NULL,
                start_location_id  INTEGER NOT NULL,
                end_date_id        INTEGER NOT NULL,
                end_time_id        INTEGER NOT NULL,
                end_location_id    INTEGER NOT NULL,
                readings           INTEGER NOT NULL,
                start_site         TEXT NOT NULL,
                end_site           TEXT NOT NULL,
                created_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS location_daily_aggregate (
                tess_id       INTEGER NOT NULL,
                date_id       INTEGER NOT NULL,
                location_id   INTEGER NOT NULL,
                same_location INTEGER NOT NULL,
                PRIMARY KEY (tess_id, date_id)
            );

            CREATE TABLE IF NOT EXISTS run_log (
                id            TEXT PRIMARY KEY,
                stage         TEXT NOT NULL,
                name_filter   TEXT,
                started_at    TEXT NOT NULL,
                finished_at   TEXT,
                rows_examined INTEGER NOT NULL DEFAULT 0,
                rows_changed  INTEGER NOT NULL DEFAULT 0,
                dry_run       INTEGER NOT NULL DEFAULT 0,
                outcome       TEXT NOT NULL DEFAULT 'running'
            );
            ",
        )?;
        Ok(())
    }

    // ── Counters & ingest ──

    pub fn get_counter(&self, name: &str) -> Result<Counter> {
        let row = self
            .conn
            .prepare("SELECT name, max_rank, max_tstamp FROM counters WHERE name = ?1")?
            .query_row(params![name], |row| {
                Ok(Counter {
                    name: row.get(0)?,
                    max_rank: row.get(1)?,
                    max_tstamp: row.get(2)?,
                })
            })
            .optional()?;
        Ok(row.unwrap_or_else(|| Counter::fresh(name)))
    }

    pub fn upsert_counter(&self, counter: &Counter) -> Result<()> {
        self.conn.execute(
            "INSERT INTO counters (name, max_rank, max_tstamp) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET max_rank = ?2, max_tstamp = ?3",
            params![counter.name, counter.max_rank, counter.max_tstamp],
        )?;
        Ok(())
    }

    /// Attempt to insert a reading at the given rank. Returns `true` on
    /// success, `false` on a `(name, date_id, time_id)` collision (the
    /// caller decides whether that collision is a duplicate to record).
    pub fn try_insert_reading(&self, reading: &Reading) -> Result<bool> {
        let result = self.conn.execute(
            "INSERT INTO readings (
                name, date_id, time_id, rank, sequence_number, frequency, magnitude,
                ambient_temperature, sky_temperature, signal_strength, seconds_in_day,
                tstamp, line_number, rejected, tess_id, location_id, units_id
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,NULL,NULL,NULL,NULL)",
            params![
                reading.name,
                reading.date_id,
                reading.time_id,
                reading.rank,
                reading.sequence_number,
                reading.frequency,
                reading.magnitude,
                reading.ambient_temperature,
                reading.sky_temperature,
                reading.signal_strength,
                reading.seconds_in_day,
                reading.tstamp,
                reading.line_number,
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn record_duplicate(&self, dup: &DuplicatedReading) -> Result<()> {
        self.conn.execute(
            "INSERT INTO duplicated_readings (name, tstamp, sequence_number, source_file, line_number)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![dup.name, dup.tstamp, dup.sequence_number, dup.source_file, dup.line_number],
        )?;
        Ok(())
    }

    pub fn count_duplicated_readings(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM duplicated_readings", [], |r| r.get(0))?)
    }

    // ── Reading queries shared across stages ──

    fn map_reading(row: &rusqlite::Row) -> rusqlite::Result<Reading> {
        Ok(Reading {
            name: row.get(0)?,
            date_id: row.get(1)?,
            time_id: row.get(2)?,
            rank: row.get(3)?,
            sequence_number: row.get(4)?,
            frequency: row.get(5)?,
            magnitude: row.get(6)?,
            ambient_temperature: row.get(7)?,
            sky_temperature: row.get(8)?,
            signal_strength: row.get(9)?,
            seconds_in_day: row.get(10)?,
            tstamp: row.get(11)?,
            line_number: row.get(12)?,
            rejected: row.get(13)?,
            tess_id: row.get(14)?,
            location_id: row.get(15)?,
            units_id: row.get(16)?,
        })
    }

    const READING_COLUMNS: &'static str = "name, date_id, time_id, rank, sequence_number, \
        frequency, magnitude, ambient_temperature, sky_temperature, signal_strength, \
        seconds_in_day, tstamp, line_number, rejected, tess_id, location_id, units_id";

    /// Distinct `(name, date_id)` groups among readings not yet rejected,
    /// with the readings-per-group count, in `(name ASC, date_id ASC)` order.
    pub fn pending_name_date_groups(&self, name_filter: Option<&str>) -> Result<Vec<(String, i32, i64)>> {
        let sql = format!(
            "SELECT name, date_id, COUNT(*) FROM readings \
             WHERE rejected IS NULL {} \
             GROUP BY name, date_id ORDER BY name ASC, date_id ASC",
            if name_filter.is_some() { "AND name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Readings for one `(name, date_id)` group, ordered by `time_id`.
    pub fn readings_for_group(&self, name: &str, date_id: i32) -> Result<Vec<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE name = ?1 AND date_id = ?2 AND rejected IS NULL ORDER BY time_id ASC",
            Self::READING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![name, date_id], Self::map_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn distinct_names(&self, name_filter: Option<&str>) -> Result<Vec<String>> {
        let sql = if name_filter.is_some() {
            "SELECT DISTINCT name FROM readings WHERE name = ?1 ORDER BY name ASC"
        } else {
            "SELECT DISTINCT name FROM readings ORDER BY name ASC"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], |r| r.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], |r| r.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Readings of `name` not yet rejected, ordered by `(date_id, time_id)`.
    pub fn accepted_readings_for_name(&self, name: &str) -> Result<Vec<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE name = ?1 AND rejected IS NULL ORDER BY date_id ASC, time_id ASC",
            Self::READING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![name], Self::map_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn reading_at(&self, name: &str, date_id: i32, time_id: i32) -> Result<Option<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            Self::READING_COLUMNS
        );
        Ok(self
            .conn
            .prepare(&sql)?
            .query_row(params![name, date_id, time_id], Self::map_reading)
            .optional()?)
    }

    pub fn mark_rejected(&self, name: &str, date_id: i32, time_id: i32, code: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE readings SET rejected = ?4 WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            params![name, date_id, time_id, code],
        )?;
        Ok(())
    }

    /// Previous not-yet-rejected reading of `name` strictly before `rank`,
    /// by rank (never by `rank - 1` arithmetic, which breaks once a rejected
    /// row has opened a gap).
    pub fn previous_accepted_reading(&self, name: &str, rank: i64) -> Result<Option<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE name = ?1 AND rank < ?2 AND rejected IS NULL \
             ORDER BY rank DESC LIMIT 1",
            Self::READING_COLUMNS
        );
        Ok(self
            .conn
            .prepare(&sql)?
            .query_row(params![name, rank], Self::map_reading)
            .optional()?)
    }

    // ── Differences ──

    pub fn insert_differences_batch(&mut self, diffs: &[Difference]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO differences
                 (name, date_id, time_id, rank, delta_seq, delta_t, period, n, control, tstamp)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            )?;
            for d in diffs {
                stmt.execute(params![
                    d.name, d.date_id, d.time_id, d.rank, d.delta_seq, d.delta_t, d.period,
                    d.n, d.control, d.tstamp
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn difference_groups(&self, name_filter: Option<&str>) -> Result<Vec<(String, i32)>> {
        let sql = format!(
            "SELECT DISTINCT name, date_id FROM differences {} ORDER BY name ASC, date_id ASC",
            if name_filter.is_some() { "WHERE name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn delta_ts_for_group(&self, name: &str, date_id: i32) -> Result<Vec<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT delta_t FROM differences WHERE name = ?1 AND date_id = ?2")?;
        let rows = stmt
            .query_map(params![name, date_id], |r| r.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Difference rows with `delta_seq > 1`, candidates for retained-value
    /// detection. Filtering on `period` happens in the caller, which
    /// has the per-name period from `GlobalStats`/`DailyStats`.
    pub fn differences_with_sequence_gap(&self, name_filter: Option<&str>) -> Result<Vec<Difference>> {
        let sql = format!(
            "SELECT name, date_id, time_id, rank, delta_seq, delta_t, period, n, control, tstamp \
             FROM differences WHERE delta_seq > 1 {} ORDER BY name ASC, rank ASC",
            if name_filter.is_some() { "AND name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let map_row = |r: &rusqlite::Row| {
            Ok(Difference {
                name: r.get(0)?,
                date_id: r.get(1)?,
                time_id: r.get(2)?,
                rank: r.get(3)?,
                delta_seq: r.get(4)?,
                delta_t: r.get(5)?,
                period: r.get(6)?,
                n: r.get(7)?,
                control: r.get(8)?,
                tstamp: r.get(9)?,
            })
        };
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    // ── Daily / global stats ──

    pub fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<()> {
        self.conn.execute(
            "INSERT INTO daily_stats (name, date_id, mean, median, stddev, n, min, max)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(name, date_id) DO UPDATE SET
                mean = ?3, median = ?4, stddev = ?5, n = ?6, min = ?7, max = ?8",
            params![stat.name, stat.date_id, stat.mean, stat.median, stat.stddev, stat.n, stat.min, stat.max],
        )?;
        Ok(())
    }

    pub fn daily_stat(&self, name: &str, date_id: i32) -> Result<Option<DailyStat>> {
        Ok(self
            .conn
            .prepare("SELECT name, date_id, mean, median, stddev, n, min, max FROM daily_stats WHERE name = ?1 AND date_id = ?2")?
            .query_row(params![name, date_id], |r| {
                Ok(DailyStat {
                    name: r.get(0)?,
                    date_id: r.get(1)?,
                    mean: r.get(2)?,
                    median: r.get(3)?,
                    stddev: r.get(4)?,
                    n: r.get(5)?,
                    min: r.get(6)?,
                    max: r.get(7)?,
                })
            })
            .optional()?)
    }

    pub fn daily_medians_for_name(&self, name: &str) -> Result<Vec<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT median FROM daily_stats WHERE name = ?1 ORDER BY date_id ASC")?;
        let rows = stmt
            .query_map(params![name], |r| r.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn names_with_daily_stats(&self, name_filter: Option<&str>) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT name FROM daily_stats {} ORDER BY name ASC",
            if name_filter.is_some() { "WHERE name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], |r| r.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], |r| r.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn upsert_global_stat(&self, stat: &GlobalStat) -> Result<()> {
        self.conn.execute(
            "INSERT INTO global_stats (name, median, n, method) VALUES (?1,?2,?3,?4)
             ON CONFLICT(name) DO UPDATE SET median = ?2, n = ?3, method = ?4",
            params![stat.name, stat.median, stat.n, stat.method.as_str()],
        )?;
        Ok(())
    }

    pub fn global_stat(&self, name: &str) -> Result<Option<GlobalStat>> {
        Ok(self
            .conn
            .prepare("SELECT name, median, n, method FROM global_stats WHERE name = ?1")?
            .query_row(params![name], |r| {
                let method: String = r.get(3)?;
                Ok(GlobalStat {
                    name: r.get(0)?,
                    median: r.get(1)?,
                    n: r.get(2)?,
                    method: GlobalStatsMethod::parse(&method),
                })
            })
            .optional()?)
    }

    // ── Location resolution ──

    pub fn set_location_id(&self, name: &str, date_id: i32, time_id: i32, location_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE readings SET location_id = ?4 WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            params![name, date_id, time_id, location_id],
        )?;
        Ok(())
    }

    pub fn clear_rejected(&self, name: &str, date_id: i32, time_id: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE readings SET rejected = NULL WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            params![name, date_id, time_id],
        )?;
        Ok(())
    }

    pub fn clear_location_id(&self, name: &str, date_id: i32, time_id: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE readings SET location_id = NULL WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            params![name, date_id, time_id],
        )?;
        Ok(())
    }

    /// Readings not yet rejected, missing `location_id`, with a resolved
    /// `tess_id` (location resolution's step A input).
    pub fn readings_missing_location(&self, name_filter: Option<&str>) -> Result<Vec<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE rejected IS NULL AND location_id IS NULL \
             AND tess_id IS NOT NULL {} ORDER BY name ASC, date_id ASC, time_id ASC",
            Self::READING_COLUMNS,
            if name_filter.is_some() { "AND name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], Self::map_reading)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], Self::map_reading)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn upsert_location_daily_aggregate(
        &self,
        tess_id: i64,
        date_id: i32,
        location_id: i64,
        same_location: bool,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO location_daily_aggregate (tess_id, date_id, location_id, same_location)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(tess_id, date_id) DO UPDATE SET location_id = ?3, same_location = ?4",
            params![tess_id, date_id, location_id, same_location as i32],
        )?;
        Ok(())
    }

    /// Metadata refresh's bulk form of [`Self::upsert_location_daily_aggregate`],
    /// one transaction for the whole reference-store materialization.
    pub fn upsert_location_daily_aggregates_batch(&mut self, rows: &[(i64, i32, i64, bool)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO location_daily_aggregate (tess_id, date_id, location_id, same_location)
                 VALUES (?1,?2,?3,?4)
                 ON CONFLICT(tess_id, date_id) DO UPDATE SET location_id = ?3, same_location = ?4",
            )?;
            for (tess_id, date_id, location_id, same_location) in rows {
                stmt.execute(params![tess_id, date_id, location_id, *same_location as i32])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn location_daily_aggregate(&self, tess_id: i64, date_id: i32) -> Result<Option<(i64, bool)>> {
        Ok(self
            .conn
            .prepare("SELECT location_id, same_location FROM location_daily_aggregate WHERE tess_id = ?1 AND date_id = ?2")?
            .query_row(params![tess_id, date_id], |r| {
                let same: i32 = r.get(1)?;
                Ok((r.get::<_, i64>(0)?, same != 0))
            })
            .optional()?)
    }

    pub fn insert_location_gap(&self, gap: &LocationGap) -> Result<()> {
        self.conn.execute(
            "INSERT INTO location_gaps (
                name, start_date_id, start_time_id, start_location_id,
                end_date_id, end_time_id, end_location_id, readings, start_site, end_site
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                gap.name, gap.start_date_id, gap.start_time_id, gap.start_location_id,
                gap.end_date_id, gap.end_time_id, gap.end_location_id, gap.readings,
                gap.start_site, gap.end_site
            ],
        )?;
        Ok(())
    }

    // ── Instrument resolution ──

    pub fn readings_missing_tess(&self, name_filter: Option<&str>) -> Result<Vec<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE rejected IS NULL AND tess_id IS NULL {} \
             ORDER BY name ASC, date_id ASC, time_id ASC",
            Self::READING_COLUMNS,
            if name_filter.is_some() { "AND name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], Self::map_reading)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], Self::map_reading)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    pub fn set_tess_id(&self, name: &str, date_id: i32, time_id: i32, tess_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE readings SET tess_id = ?4 WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            params![name, date_id, time_id, tess_id],
        )?;
        Ok(())
    }

    // ── Flags ──

    pub fn apply_flags(&self, units_id: i64, name_filter: Option<&str>) -> Result<usize> {
        let sql = format!(
            "UPDATE readings SET units_id = ?1 WHERE rejected IS NULL {}",
            if name_filter.is_some() { "AND name = ?2" } else { "" }
        );
        let changed = if let Some(name) = name_filter {
            self.conn.execute(&sql, params![units_id, name])?
        } else {
            self.conn.execute(&sql, params![units_id])?
        };
        Ok(changed)
    }

    // ── Reference comparison ──

    pub fn readings_ready_for_reference_compare(&self, name_filter: Option<&str>) -> Result<Vec<Reading>> {
        let sql = format!(
            "SELECT {} FROM readings WHERE rejected IS NULL AND tess_id IS NOT NULL \
             AND location_id IS NOT NULL AND units_id IS NOT NULL {} \
             ORDER BY name ASC, date_id ASC, time_id ASC",
            Self::READING_COLUMNS,
            if name_filter.is_some() { "AND name = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(name) = name_filter {
            stmt.query_map(params![name], Self::map_reading)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], Self::map_reading)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Batched variant of [`mark_rejected`](Self::mark_rejected), one
    /// transaction per call ("rejection updates commit every
    /// `batch_size_reference_reject`").
    pub fn mark_rejected_batch(&mut self, updates: &[(String, i32, i32, i32)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE readings SET rejected = ?4 WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            )?;
            for (name, date_id, time_id, code) in updates {
                stmt.execute(params![name, date_id, time_id, code])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Batched accept: sets `rejected = ACCEPTED` (code 0), one transaction
    /// per call ("OK updates commit every `batch_size_reference_ok`").
    pub fn mark_accepted_batch(&mut self, updates: &[(String, i32, i32)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE readings SET rejected = 0 WHERE name = ?1 AND date_id = ?2 AND time_id = ?3",
            )?;
            for (name, date_id, time_id) in updates {
                stmt.execute(params![name, date_id, time_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ── RunLog ──

    pub fn start_run(&self, id: &str, stage: &str, name_filter: Option<&str>, dry_run: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO run_log (id, stage, name_filter, started_at, dry_run, outcome)
             VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%SZ','now'), ?4, 'running')",
            params![id, stage, name_filter, dry_run as i32],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, id: &str, rows_examined: i64, rows_changed: i64, outcome: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE run_log SET finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now'),
             rows_examined = ?2, rows_changed = ?3, outcome = ?4 WHERE id = ?1",
            params![id, rows_examined, rows_changed, outcome],
        )?;
        Ok(())
    }

    pub fn get_run_log(&self, id: &str) -> Result<Option<RunLogEntry>> {
        Ok(self
            .conn
            .prepare(
                "SELECT id, stage, name_filter, started_at, finished_at, rows_examined, rows_changed, dry_run, outcome
                 FROM run_log WHERE id = ?1",
            )?
            .query_row(params![id], |r| {
                let dry_run: i32 = r.get(7)?;
                Ok(RunLogEntry {
                    id: r.get(0)?,
                    stage: r.get(1)?,
                    name_filter: r.get(2)?,
                    started_at: r.get(3)?,
                    finished_at: r.get(4)?,
                    rows_examined: r.get(5)?,
                    rows_changed: r.get(6)?,
                    dry_run: dry_run != 0,
                    outcome: r.get(8)?,
                })
            })
            .optional()?)
    }

    /// Raw access for stages that need ad-hoc reads not worth a dedicated
    /// DAO method (e.g. display/summary counts).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
