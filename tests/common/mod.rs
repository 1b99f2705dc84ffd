//! Shared fixtures for integration tests: real SQLite files over mocks,
//! since a temp-dir SQLite file is cheap to stand up.

use rusqlite::Connection;
use tessclean::config::AppConfig;
use tessclean::pipeline::Pipeline;

/// Writes a `;`-delimited CSV fixture and returns its path.
pub fn write_csv(dir: &tempfile::TempDir, filename: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(filename);
    let header = "tstamp;name;seq;freq;mag;tamb;tsky;rss\n";
    std::fs::write(&path, format!("{header}{body}")).unwrap();
    path
}

/// Builds an empty reference-store fixture with the schema from §6 and
/// returns its path. Schema mirrors `name_to_mac_t`/`tess_t`/
/// `tess_readings_t`/`location_t` exactly as read by `store::reference`.
pub fn build_reference_store(dir: &tempfile::TempDir, filename: &str) -> std::path::PathBuf {
    let path = dir.path().join(filename);
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE name_to_mac_t (
            name TEXT NOT NULL,
            mac_address TEXT NOT NULL,
            valid_since TEXT NOT NULL,
            valid_until TEXT NOT NULL
        );
        CREATE TABLE tess_t (
            mac_address TEXT NOT NULL,
            tess_id INTEGER NOT NULL,
            valid_since TEXT NOT NULL,
            valid_until TEXT NOT NULL
        );
        CREATE TABLE tess_readings_t (
            tess_id INTEGER NOT NULL,
            date_id INTEGER NOT NULL,
            time_id INTEGER NOT NULL,
            sequence_number INTEGER NOT NULL,
            location_id INTEGER NOT NULL
        );
        CREATE TABLE location_t (
            location_id INTEGER NOT NULL,
            site TEXT NOT NULL
        );
        ",
    )
    .unwrap();
    path
}

pub fn register_instrument(reference_db: &std::path::Path, name: &str, mac: &str, tess_id: i64) {
    let conn = Connection::open(reference_db).unwrap();
    conn.execute(
        "INSERT INTO name_to_mac_t (name, mac_address, valid_since, valid_until) VALUES (?1, ?2, '2000-01-01T00:00:00Z', '2100-01-01T00:00:00Z')",
        rusqlite::params![name, mac],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO tess_t (mac_address, tess_id, valid_since, valid_until) VALUES (?1, ?2, '2000-01-01T00:00:00Z', '2100-01-01T00:00:00Z')",
        rusqlite::params![mac, tess_id],
    )
    .unwrap();
}

pub fn insert_location(reference_db: &std::path::Path, location_id: i64, site: &str) {
    let conn = Connection::open(reference_db).unwrap();
    conn.execute(
        "INSERT INTO location_t (location_id, site) VALUES (?1, ?2)",
        rusqlite::params![location_id, site],
    )
    .unwrap();
}

pub fn insert_reference_reading(
    reference_db: &std::path::Path,
    tess_id: i64,
    date_id: i32,
    time_id: i32,
    sequence_number: i64,
    location_id: i64,
) {
    let conn = Connection::open(reference_db).unwrap();
    conn.execute(
        "INSERT INTO tess_readings_t (tess_id, date_id, time_id, sequence_number, location_id) VALUES (?1,?2,?3,?4,?5)",
        rusqlite::params![tess_id, date_id, time_id, sequence_number, location_id],
    )
    .unwrap();
}

pub fn open_pipeline(working_db: &std::path::Path, reference_db: &std::path::Path) -> Pipeline {
    let mut config = AppConfig::default();
    config.store.working_db = working_db.display().to_string();
    config.store.reference_db = reference_db.display().to_string();
    Pipeline::open(config).unwrap()
}
