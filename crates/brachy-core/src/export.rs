//! Row extraction and text rendering for a merged grid.
//!
//! Everything here borrows the grid immutably. File placement lives in the
//! store crate; this module only decides what the rows are and how they read.

use std::fmt::Write as _;

use serde::Serialize;

use crate::constants::KEV_PER_MEV;
use crate::grid::AccumulatorGrid;
use crate::histogram::Channel;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RadialRow {
    pub radius_cm: f64,
    pub dose: f64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AngularRow {
    pub radius_cm: f64,
    pub theta_deg: f64,
    pub dose: f64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VoxelRow {
    pub x_cm: f64,
    pub y_cm: f64,
    /// MeV.
    pub energy: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpectrumRow {
    pub energy_kev: f64,
    pub count: u64,
}

/// Energy unit applied when rendering voxel maps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnergyUnit {
    MeV,
    #[default]
    KeV,
}

impl EnergyUnit {
    pub fn from_mev(self, mev: f64) -> f64 {
        match self {
            EnergyUnit::MeV => mev,
            EnergyUnit::KeV => mev * KEV_PER_MEV,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EnergyUnit::MeV => "MeV",
            EnergyUnit::KeV => "keV",
        }
    }

    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mev" => Some(EnergyUnit::MeV),
            "kev" => Some(EnergyUnit::KeV),
            _ => None,
        }
    }
}

/// One row per radial bin, empty bins included.
pub fn radial_rows(grid: &AccumulatorGrid, channel: Channel) -> Vec<RadialRow> {
    let binning = grid.layout().radial;
    let hist = grid.radial.channel(channel);
    (0..binning.bins)
        .map(|i| RadialRow {
            radius_cm: binning.center(i),
            dose: hist.value(i),
            count: hist.count(i),
        })
        .collect()
}

/// One row per (radial, angular) cell, empty cells included, radius-major.
pub fn angular_rows(grid: &AccumulatorGrid, channel: Channel) -> Vec<AngularRow> {
    let layout = grid.layout();
    let hist = grid.angular.channel(channel);
    (0..layout.angular_len())
        .map(|idx| {
            let (r, a) = layout.angular_unflat(idx);
            AngularRow {
                radius_cm: layout.radial.center(r),
                theta_deg: layout.angular.center(a).to_degrees(),
                dose: hist.value(idx),
                count: hist.count(idx),
            }
        })
        .collect()
}

/// Voxels with non-zero energy, in row-major `(ix, iy)` order.
pub fn voxel_rows(grid: &AccumulatorGrid, channel: Channel) -> Vec<VoxelRow> {
    let binning = grid.layout().voxel;
    grid.voxel
        .channel(channel)
        .values()
        .iter()
        .enumerate()
        .filter(|(_, energy)| **energy != 0.0)
        .map(|(idx, &energy)| {
            let (ix, iy) = binning.unflat(idx);
            let (x_cm, y_cm) = binning.center(ix, iy);
            VoxelRow { x_cm, y_cm, energy }
        })
        .collect()
}

/// One row per spectrum bin; empty when the spectrum is disabled.
pub fn spectrum_rows(grid: &AccumulatorGrid) -> Vec<SpectrumRow> {
    let binning = grid.layout().spectrum;
    grid.spectrum
        .counts()
        .iter()
        .enumerate()
        .map(|(i, &count)| SpectrumRow {
            energy_kev: binning.center(i),
            count,
        })
        .collect()
}

/// Run-level totals. Energies are MeV from the energy tally, so deposits
/// outside every projection still count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DoseSummary {
    pub total_primary: f64,
    pub total_secondary: f64,
    /// `primary / secondary`, or 0 when nothing secondary was scored.
    pub ratio: f64,
    pub total: f64,
    pub primary_count: u64,
    pub secondary_count: u64,
    pub events: u64,
    pub mean_event_energy: f64,
    pub rms_event_energy: f64,
}

pub fn summary(grid: &AccumulatorGrid) -> DoseSummary {
    let tally = &grid.energy;
    let ratio = if tally.secondary > 0.0 {
        tally.primary / tally.secondary
    } else {
        0.0
    };
    DoseSummary {
        total_primary: tally.primary,
        total_secondary: tally.secondary,
        ratio,
        total: tally.total,
        primary_count: tally.primary_count,
        secondary_count: tally.secondary_count,
        events: grid.events.events,
        mean_event_energy: grid.events.mean(),
        rms_event_energy: grid.events.rms(),
    }
}

pub fn format_radial_table(rows: &[RadialRow]) -> String {
    let mut out = String::from("# radius_cm\tdose\tcount\n");
    for row in rows {
        let _ = writeln!(out, "{:.4}\t{:.4}\t{}", row.radius_cm, row.dose, row.count);
    }
    out
}

pub fn format_angular_table(rows: &[AngularRow]) -> String {
    let mut out = String::from("# radius_cm\ttheta_deg\tdose\tcount\n");
    for row in rows {
        let _ = writeln!(
            out,
            "{:.4}\t{:.4}\t{:.4}\t{}",
            row.radius_cm, row.theta_deg, row.dose, row.count
        );
    }
    out
}

/// Sparse voxel map; energies are converted to `unit` here and nowhere else.
pub fn format_voxel_map(rows: &[VoxelRow], unit: EnergyUnit) -> String {
    let mut out = format!("# x_cm  y_cm  energy_{}\n", unit.label());
    for row in rows {
        let _ = writeln!(
            out,
            "{:.4}  {:.4}  {:.4}",
            row.x_cm,
            row.y_cm,
            unit.from_mev(row.energy)
        );
    }
    out
}

pub fn format_spectrum(rows: &[SpectrumRow]) -> String {
    let mut out = String::from("# energy_kev\tcount\n");
    for row in rows {
        let _ = writeln!(out, "{:.1}\t{}", row.energy_kev, row.count);
    }
    out
}

pub fn format_summary(summary: &DoseSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Events:              {}", summary.events);
    let _ = writeln!(out, "Total energy:        {:.6} MeV", summary.total);
    let _ = writeln!(
        out,
        "Primary energy:      {:.6} MeV ({} deposits)",
        summary.total_primary, summary.primary_count
    );
    let _ = writeln!(
        out,
        "Secondary energy:    {:.6} MeV ({} deposits)",
        summary.total_secondary, summary.secondary_count
    );
    let _ = writeln!(out, "Primary/secondary:   {:.6}", summary.ratio);
    let _ = writeln!(
        out,
        "Energy per event:    {:.6} MeV (rms {:.6} MeV)",
        summary.mean_event_energy, summary.rms_event_energy
    );
    out
}
