//! Versioned JSON interchange for a finished run.
//!
//! A snapshot carries the scoring configuration next to the merged grid so a
//! reader can rebuild exports without the original input stream.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::grid::AccumulatorGrid;

pub const CURRENT_VERSION: &str = "1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub version: String,
    #[serde(default)]
    pub label: String,
    /// Worker count of the producing run; 0 when unknown.
    #[serde(default)]
    pub workers: usize,
    pub config: ScoringConfig,
    pub grid: AccumulatorGrid,
}

impl RunSnapshot {
    pub fn new(label: &str, config: &ScoringConfig, grid: &AccumulatorGrid) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            label: label.to_string(),
            workers: 0,
            config: config.clone(),
            grid: grid.clone(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Serialize a run to pretty-printed JSON.
pub fn export_json(snapshot: &RunSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}

/// Parse a snapshot and check that its channels agree with its layout.
pub fn import_json(json: &str) -> Result<RunSnapshot, serde_json::Error> {
    let snapshot: RunSnapshot = serde_json::from_str(json)?;
    if snapshot.version != CURRENT_VERSION {
        return Err(serde_json::Error::custom(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }
    snapshot.grid.check_shape().map_err(serde_json::Error::custom)?;
    if snapshot.grid.layout() != &snapshot.config.layout() {
        return Err(serde_json::Error::custom(
            "snapshot grid layout does not match its config",
        ));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Projections;
    use crate::histogram::Channel;
    use crate::record::TransportStepRecord;

    fn small_config() -> ScoringConfig {
        let mut config = ScoringConfig::default();
        config.radial.bins = 10;
        config.voxel.bins = 20;
        config.spectrum.bins = 50;
        config
    }

    fn sample() -> RunSnapshot {
        let config = small_config();
        let mut grid = AccumulatorGrid::new(config.layout());
        let record = TransportStepRecord {
            step_length: 0.02,
            density: 1.06,
            ancestry_depth: 2,
            ..TransportStepRecord::new("Phantom", 0.3, [0.4, -0.2, 0.0])
        };
        grid.deposit(&record, Projections::ALL);
        grid.record_event(0.3);
        grid.fill_spectrum(35.5);
        RunSnapshot::new("unit", &config, &grid).with_workers(2)
    }

    #[test]
    fn test_export_import() {
        let snap = sample();
        let json = export_json(&snap).unwrap();
        assert!(json.contains("\"version\": \"1\""));
        let back = import_json(&json).unwrap();
        assert_eq!(back, snap);
        assert_eq!(back.workers, 2);
        assert_eq!(back.grid.voxel.channel(Channel::Secondary).total_count(), 1);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snap = sample();
        snap.version = "0".to_string();
        let json = serde_json::to_string(&snap).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn test_rejects_truncated_channel() {
        let mut snap = sample();
        snap.grid.radial.total = crate::histogram::HistogramChannel::new(3);
        let json = serde_json::to_string(&snap).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("radial layout mismatch"));
    }

    #[test]
    fn test_rejects_config_grid_disagreement() {
        let mut snap = sample();
        snap.config.angular.bins = 36;
        let json = serde_json::to_string(&snap).unwrap();
        assert!(import_json(&json).is_err());
    }
}
