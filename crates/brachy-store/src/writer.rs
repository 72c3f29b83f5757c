//! Export file set for one merged run.

use std::fs;
use std::path::{Path, PathBuf};

use brachy_core::{
    AccumulatorGrid, Channel, EnergyUnit, angular_rows, format_angular_table, format_radial_table,
    format_spectrum, format_summary, format_voxel_map, radial_rows, spectrum_rows, summary,
    voxel_rows,
};

use crate::error::{Result, StoreError};

const LINEAGES: [Channel; 2] = [Channel::Primary, Channel::Secondary];

/// A label becomes part of every export file name, so it must stay a plain
/// name component.
pub fn check_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(StoreError::InvalidData("run label is empty".to_string()));
    }
    if let Some(c) = label
        .chars()
        .find(|&c| matches!(c, '/' | '\\') || c.is_control())
    {
        return Err(StoreError::InvalidData(format!(
            "run label {label:?} contains {c:?}; labels are used in file names"
        )));
    }
    Ok(())
}

/// Write every export for `grid` into `dir`, named with `label`. Returns the
/// paths written, in write order. The directory is created if missing.
pub fn export_run(
    dir: &Path,
    label: &str,
    grid: &AccumulatorGrid,
    unit: EnergyUnit,
) -> Result<Vec<PathBuf>> {
    check_label(label)?;
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for channel in LINEAGES {
        let path = dir.join(format!("radial_dose_{channel}_{label}.dat"));
        fs::write(&path, format_radial_table(&radial_rows(grid, channel)))?;
        written.push(path);
    }
    for channel in LINEAGES {
        let path = dir.join(format!("angular_dose_{channel}_{label}.dat"));
        fs::write(&path, format_angular_table(&angular_rows(grid, channel)))?;
        written.push(path);
    }
    for channel in LINEAGES {
        let path = dir.join(format!("dose_map_{channel}_{label}.dat"));
        fs::write(&path, format_voxel_map(&voxel_rows(grid, channel), unit))?;
        written.push(path);
    }

    let path = dir.join(format!("summary_{label}.txt"));
    fs::write(&path, format_summary(&summary(grid)))?;
    written.push(path);

    if grid.layout().spectrum.enabled {
        let path = dir.join(format!("spectrum_{label}.dat"));
        fs::write(&path, format_spectrum(&spectrum_rows(grid)))?;
        written.push(path);
    }

    tracing::info!(dir = %dir.display(), files = written.len(), "exported run");
    Ok(written)
}
