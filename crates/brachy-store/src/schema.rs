use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    // Only non-empty bins are stored; a run's grid is rebuilt from its config
    // and these rows.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS runs (
            id                  TEXT PRIMARY KEY,
            label               TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            workers             INTEGER NOT NULL,
            config              TEXT NOT NULL,
            energy_primary      REAL NOT NULL DEFAULT 0,
            energy_secondary    REAL NOT NULL DEFAULT 0,
            energy_total        REAL NOT NULL DEFAULT 0,
            count_primary       INTEGER NOT NULL DEFAULT 0,
            count_secondary     INTEGER NOT NULL DEFAULT 0,
            count_total         INTEGER NOT NULL DEFAULT 0,
            events              INTEGER NOT NULL DEFAULT 0,
            event_energy_sum    REAL NOT NULL DEFAULT 0,
            event_energy_sq_sum REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS bins (
            run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            projection TEXT NOT NULL,
            channel    TEXT NOT NULL,
            idx        INTEGER NOT NULL,
            value      REAL NOT NULL,
            count      INTEGER NOT NULL,
            PRIMARY KEY (run_id, projection, channel, idx)
        );

        CREATE TABLE IF NOT EXISTS spectrum_bins (
            run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            idx    INTEGER NOT NULL,
            count  INTEGER NOT NULL,
            PRIMARY KEY (run_id, idx)
        );

        CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Version recorded in `metadata`, or `None` for an uninitialized database.
pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.parse().ok()))
}
