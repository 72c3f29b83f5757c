use std::path::{Path, PathBuf};
use std::{env, fs};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use uuid::Uuid;

use brachy_core::{AccumulatorGrid, Channel, Projection, ScoringConfig};

use crate::error::{Result, StoreError};
use crate::schema;
use crate::time::now_iso8601;

pub const ARCHIVE_FILE: &str = "runs.db";

/// `$HOME/.brachy-dose`, or the working directory when no home is set.
pub fn default_data_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".brachy-dose")
}

/// Summary row for one archived run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub label: String,
    pub created_at: String,
    pub workers: usize,
    pub events: u64,
    pub energy_primary: f64,
    pub energy_secondary: f64,
    pub energy_total: f64,
}

/// A run restored from the archive.
#[derive(Clone, Debug)]
pub struct StoredRun {
    pub record: RunRecord,
    pub config: ScoringConfig,
    pub grid: AccumulatorGrid,
}

pub struct RunArchive {
    conn: Connection,
}

impl RunArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Open `runs.db` inside `dir`, creating the directory as needed.
    pub fn open_dir(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", dir.display()))
        })?;
        Self::open(&dir.join(ARCHIVE_FILE))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Save ---

    /// Archive a merged grid with the configuration that produced it.
    pub fn save_run(
        &self,
        label: &str,
        config: &ScoringConfig,
        grid: &AccumulatorGrid,
        workers: usize,
    ) -> Result<RunRecord> {
        if grid.layout() != &config.layout() {
            return Err(StoreError::InvalidData(
                "grid layout does not match the run configuration".to_string(),
            ));
        }

        let record = RunRecord {
            id: Uuid::new_v4(),
            label: label.to_string(),
            created_at: now_iso8601(),
            workers,
            events: grid.events.events,
            energy_primary: grid.energy.primary,
            energy_secondary: grid.energy.secondary,
            energy_total: grid.energy.total,
        };
        let config_json = serde_json::to_string(config)?;
        let id = record.id.to_string();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO runs (id, label, created_at, workers, config,
                               energy_primary, energy_secondary, energy_total,
                               count_primary, count_secondary, count_total,
                               events, event_energy_sum, event_energy_sq_sum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id,
                record.label,
                record.created_at,
                workers as i64,
                config_json,
                grid.energy.primary,
                grid.energy.secondary,
                grid.energy.total,
                grid.energy.primary_count as i64,
                grid.energy.secondary_count as i64,
                grid.energy.total_count as i64,
                grid.events.events as i64,
                grid.events.energy_sum,
                grid.events.energy_sq_sum,
            ],
        )?;

        let mut stored = 0usize;
        {
            let mut insert = tx.prepare(
                "INSERT INTO bins (run_id, projection, channel, idx, value, count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for projection in Projection::ALL {
                let set = grid.projection(projection);
                for channel in Channel::ALL {
                    for (idx, value, count) in set.channel(channel).occupied() {
                        insert.execute(params![
                            id,
                            projection.as_str(),
                            channel.as_str(),
                            idx as i64,
                            value,
                            count as i64,
                        ])?;
                        stored += 1;
                    }
                }
            }

            let mut insert = tx.prepare(
                "INSERT INTO spectrum_bins (run_id, idx, count) VALUES (?1, ?2, ?3)",
            )?;
            for (idx, _, count) in grid.spectrum.occupied() {
                insert.execute(params![id, idx as i64, count as i64])?;
            }
        }
        tx.commit()?;

        tracing::info!(run = %record.id, label = %record.label, bins = stored, "archived run");
        Ok(record)
    }

    // --- Load ---

    /// Resolve a full run id or a unique prefix of one. The prefix is
    /// compared literally; an empty prefix is refused.
    pub fn resolve_run_id(&self, prefix: &str) -> Result<Uuid> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(StoreError::InvalidData("empty run id prefix".to_string()));
        }
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM runs WHERE substr(id, 1, length(?1)) = ?1 LIMIT 2")?;
        let ids: Vec<String> = stmt
            .query_map([prefix], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        match ids.as_slice() {
            [] => Err(StoreError::InvalidData(format!("run not found: {prefix}"))),
            [id] => parse_uuid(id),
            _ => Err(StoreError::InvalidData(format!(
                "run id prefix is ambiguous: {prefix}"
            ))),
        }
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, label, created_at, workers, events,
                    energy_primary, energy_secondary, energy_total
             FROM runs ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows: Vec<(String, String, String, i64, i64, f64, f64, f64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(
                |(id, label, created_at, workers, events, primary, secondary, total)| {
                    Ok(RunRecord {
                        id: parse_uuid(&id)?,
                        label,
                        created_at,
                        workers: workers as usize,
                        events: events as u64,
                        energy_primary: primary,
                        energy_secondary: secondary,
                        energy_total: total,
                    })
                },
            )
            .collect()
    }

    pub fn load_run(&self, id: &Uuid) -> Result<StoredRun> {
        let id_str = id.to_string();
        let row = self
            .conn
            .query_row(
                "SELECT label, created_at, workers, config,
                        energy_primary, energy_secondary, energy_total,
                        count_primary, count_secondary, count_total,
                        events, event_energy_sum, event_energy_sq_sum
                 FROM runs WHERE id = ?1",
                [&id_str],
                |row| {
                    Ok(LoadedRow {
                        label: row.get(0)?,
                        created_at: row.get(1)?,
                        workers: row.get(2)?,
                        config: row.get(3)?,
                        energy: [row.get(4)?, row.get(5)?, row.get(6)?],
                        counts: [row.get(7)?, row.get(8)?, row.get(9)?],
                        events: row.get(10)?,
                        event_sums: [row.get(11)?, row.get(12)?],
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::InvalidData(format!("run not found: {id}")))?;

        let config: ScoringConfig = serde_json::from_str(&row.config)?;
        let mut grid = AccumulatorGrid::new(config.layout());
        grid.energy.primary = row.energy[0];
        grid.energy.secondary = row.energy[1];
        grid.energy.total = row.energy[2];
        grid.energy.primary_count = row.counts[0] as u64;
        grid.energy.secondary_count = row.counts[1] as u64;
        grid.energy.total_count = row.counts[2] as u64;
        grid.events.events = row.events as u64;
        grid.events.energy_sum = row.event_sums[0];
        grid.events.energy_sq_sum = row.event_sums[1];

        self.load_bins(&id_str, &mut grid)?;
        self.load_spectrum(&id_str, &mut grid)?;
        grid.check_shape()?;

        Ok(StoredRun {
            record: RunRecord {
                id: *id,
                label: row.label,
                created_at: row.created_at,
                workers: row.workers as usize,
                events: row.events as u64,
                energy_primary: row.energy[0],
                energy_secondary: row.energy[1],
                energy_total: row.energy[2],
            },
            config,
            grid,
        })
    }

    fn load_bins(&self, run_id: &str, grid: &mut AccumulatorGrid) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT projection, channel, idx, value, count FROM bins WHERE run_id = ?1",
        )?;
        let rows: Vec<(String, String, i64, f64, i64)> = stmt
            .query_map([run_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        for (projection, channel, idx, value, count) in rows {
            let projection = Projection::from_str_lossy(&projection).ok_or_else(|| {
                StoreError::InvalidData(format!("unknown projection: {projection}"))
            })?;
            let channel = Channel::from_str_lossy(&channel)
                .ok_or_else(|| StoreError::InvalidData(format!("unknown channel: {channel}")))?;
            let hist = grid.projection_mut(projection).channel_mut(channel);
            let idx = checked_index(idx, hist.len(), projection.as_str())?;
            hist.set(idx, value, count as u64);
        }
        Ok(())
    }

    fn load_spectrum(&self, run_id: &str, grid: &mut AccumulatorGrid) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT idx, count FROM spectrum_bins WHERE run_id = ?1")?;
        let rows: Vec<(i64, i64)> = stmt
            .query_map([run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        for (idx, count) in rows {
            let idx = checked_index(idx, grid.spectrum.len(), "spectrum")?;
            grid.spectrum.set(idx, count as f64, count as u64);
        }
        Ok(())
    }

    // --- Delete ---

    /// Remove a run and its bins. Returns false if no such run existed.
    pub fn delete_run(&self, id: &Uuid) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM runs WHERE id = ?1", [id.to_string()])?;
        if rows > 0 {
            tracing::info!(run = %id, "deleted run");
        }
        Ok(rows > 0)
    }

    pub fn run_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

struct LoadedRow {
    label: String,
    created_at: String,
    workers: i64,
    config: String,
    energy: [f64; 3],
    counts: [i64; 3],
    events: i64,
    event_sums: [f64; 2],
}

fn checked_index(idx: i64, len: usize, what: &str) -> Result<usize> {
    usize::try_from(idx)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| StoreError::InvalidData(format!("{what} bin {idx} out of range 0..{len}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use brachy_core::{EventIngest, SynthParams, synth};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn sample_grid(config: &ScoringConfig) -> AccumulatorGrid {
        let params = SynthParams {
            events: 30,
            ..SynthParams::default()
        };
        let steps = synth::stream(&params, &mut SmallRng::seed_from_u64(42));
        let mut grid = AccumulatorGrid::new(config.layout());
        let mut ingest = EventIngest::from_config(&mut grid, config).unwrap();
        ingest.process_all(&steps);
        ingest.finish();
        grid
    }

    #[test]
    fn test_save_load_preserves_grid() {
        let archive = RunArchive::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let grid = sample_grid(&config);

        let record = archive.save_run("unit", &config, &grid, 2).unwrap();
        let loaded = archive.load_run(&record.id).unwrap();

        assert_eq!(loaded.record, record);
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.grid, grid);
        assert_relative_eq!(loaded.grid.events.rms(), grid.events.rms());
    }

    #[test]
    fn test_only_occupied_bins_stored() {
        let archive = RunArchive::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let grid = sample_grid(&config);
        archive.save_run("unit", &config, &grid, 1).unwrap();

        let expected: usize = Projection::ALL
            .iter()
            .flat_map(|p| {
                let set = grid.projection(*p);
                Channel::ALL.map(|c| set.channel(c).occupied().count())
            })
            .sum();
        let stored: i64 = archive
            .conn()
            .query_row("SELECT COUNT(*) FROM bins", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored as usize, expected);
        assert!(expected < 3 * (90 + 18 + 180 * 180));
    }

    #[test]
    fn test_list_and_delete() {
        let archive = RunArchive::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let grid = sample_grid(&config);
        let a = archive.save_run("a", &config, &grid, 1).unwrap();
        let b = archive.save_run("b", &config, &grid, 4).unwrap();

        let runs = archive.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        // newest first
        assert_eq!(runs[0].id, b.id);

        assert!(archive.delete_run(&a.id).unwrap());
        assert!(!archive.delete_run(&a.id).unwrap());
        assert_eq!(archive.run_count().unwrap(), 1);
        assert!(archive.load_run(&a.id).is_err());

        let orphaned: i64 = archive
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM bins WHERE run_id = ?1",
                [a.id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphaned, 0);
    }

    #[test]
    fn test_resolve_prefix() {
        let archive = RunArchive::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let grid = AccumulatorGrid::new(config.layout());
        let record = archive.save_run("p", &config, &grid, 1).unwrap();
        let full = record.id.to_string();

        assert_eq!(archive.resolve_run_id(&full[..8]).unwrap(), record.id);
        assert_eq!(archive.resolve_run_id(&full).unwrap(), record.id);
        assert!(archive.resolve_run_id("zzzz").is_err());
        assert!(archive.resolve_run_id("").is_err());
        assert!(archive.resolve_run_id("   ").is_err());
    }

    #[test]
    fn test_resolve_prefix_is_literal() {
        let archive = RunArchive::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let grid = AccumulatorGrid::new(config.layout());
        let record = archive.save_run("p", &config, &grid, 1).unwrap();

        for pattern in ["%", "_", "________", "%-%", "_%"] {
            let err = archive.resolve_run_id(pattern).unwrap_err();
            assert!(err.to_string().contains("run not found"), "{pattern}: {err}");
        }
        assert_eq!(archive.run_count().unwrap(), 1);
        assert_eq!(
            archive.resolve_run_id(&record.id.to_string()[..4]).unwrap(),
            record.id
        );
    }

    #[test]
    fn test_layout_mismatch_refused() {
        let archive = RunArchive::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let mut other = config.clone();
        other.radial.bins = 45;
        let grid = AccumulatorGrid::new(other.layout());
        assert!(matches!(
            archive.save_run("x", &config, &grid, 1),
            Err(StoreError::InvalidData(_))
        ));
        assert_eq!(archive.run_count().unwrap(), 0);
    }

    #[test]
    fn test_metadata() {
        let archive = RunArchive::open_in_memory().unwrap();
        assert_eq!(archive.get_metadata("source").unwrap(), None);
        archive.set_metadata("source", "Ir-192").unwrap();
        assert_eq!(
            archive.get_metadata("source").unwrap().as_deref(),
            Some("Ir-192")
        );
    }

    #[test]
    fn test_open_dir_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("nested");
        let archive = RunArchive::open_dir(&data).unwrap();
        assert_eq!(archive.run_count().unwrap(), 0);
        assert!(data.join(ARCHIVE_FILE).exists());
    }
}
