//! Per-worker accumulation of deposits into the radial, angular and voxel
//! projections.
//!
//! Radial and angular profiles accumulate a dose estimate (MeV/g) from the
//! step's approximate mass; the voxel map accumulates raw deposited energy
//! (MeV). The two normalizations are intentionally different and are kept
//! that way so exported numbers line up with the reference scoring mesh.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binning::{planar_radius, polar_angle};
use crate::classify::{Verdict, classify};
use crate::config::GridLayout;
use crate::constants::UNIT_CROSS_SECTION_CM2;
use crate::histogram::{Channel, ChannelSet, HistogramChannel, LayoutMismatch};
use crate::record::TransportStepRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    Radial,
    Angular,
    Voxel,
}

impl Projection {
    pub const ALL: [Projection; 3] = [Projection::Radial, Projection::Angular, Projection::Voxel];

    pub fn as_str(self) -> &'static str {
        match self {
            Projection::Radial => "radial",
            Projection::Angular => "angular",
            Projection::Voxel => "voxel",
        }
    }

    pub fn from_str_lossy(s: &str) -> Option<Self> {
        match s {
            "radial" => Some(Projection::Radial),
            "angular" => Some(Projection::Angular),
            "voxel" => Some(Projection::Voxel),
            _ => None,
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which projections a deposit may land in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Projections {
    pub radial: bool,
    pub angular: bool,
    pub voxel: bool,
}

impl Projections {
    pub const ALL: Projections = Projections {
        radial: true,
        angular: true,
        voxel: true,
    };

    pub const NONE: Projections = Projections {
        radial: false,
        angular: false,
        voxel: false,
    };

    pub fn only(projection: Projection) -> Self {
        let mut p = Projections::NONE;
        match projection {
            Projection::Radial => p.radial = true,
            Projection::Angular => p.angular = true,
            Projection::Voxel => p.voxel = true,
        }
        p
    }
}

impl Default for Projections {
    fn default() -> Self {
        Projections::ALL
    }
}

/// Where a single deposit ended up. `verdict` is `None` when the record was
/// rejected before classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepositOutcome {
    pub verdict: Option<Verdict>,
    pub radial: bool,
    pub angular: bool,
    pub voxel: bool,
}

impl DepositOutcome {
    pub fn accepted(&self) -> bool {
        self.verdict.is_some()
    }

    pub fn landed_anywhere(&self) -> bool {
        self.radial || self.angular || self.voxel
    }
}

/// Deposited energy of every accepted record, independent of binning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyTally {
    pub primary: f64,
    pub secondary: f64,
    pub total: f64,
    pub primary_count: u64,
    pub secondary_count: u64,
    pub total_count: u64,
}

impl EnergyTally {
    pub fn add(&mut self, energy: f64, verdict: Verdict) {
        self.total += energy;
        self.total_count += 1;
        match verdict {
            Verdict::Primary => {
                self.primary += energy;
                self.primary_count += 1;
            }
            Verdict::Secondary => {
                self.secondary += energy;
                self.secondary_count += 1;
            }
        }
    }

    pub fn energy(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Primary => self.primary,
            Channel::Secondary => self.secondary,
            Channel::Total => self.total,
        }
    }

    pub fn merge(&mut self, other: &EnergyTally) {
        self.primary += other.primary;
        self.secondary += other.secondary;
        self.total += other.total;
        self.primary_count += other.primary_count;
        self.secondary_count += other.secondary_count;
        self.total_count += other.total_count;
    }
}

/// Per-event deposited energy moments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStats {
    pub events: u64,
    pub energy_sum: f64,
    pub energy_sq_sum: f64,
}

impl EventStats {
    pub fn record(&mut self, event_energy: f64) {
        self.events += 1;
        self.energy_sum += event_energy;
        self.energy_sq_sum += event_energy * event_energy;
    }

    pub fn mean(&self) -> f64 {
        if self.events == 0 {
            return 0.0;
        }
        self.energy_sum / self.events as f64
    }

    /// `sqrt(Σe² − (Σe)²/n)`, floored at zero.
    pub fn rms(&self) -> f64 {
        if self.events == 0 {
            return 0.0;
        }
        let spread = self.energy_sq_sum - self.energy_sum * self.energy_sum / self.events as f64;
        if spread > 0.0 { spread.sqrt() } else { 0.0 }
    }

    pub fn merge(&mut self, other: &EventStats) {
        self.events += other.events;
        self.energy_sum += other.energy_sum;
        self.energy_sq_sum += other.energy_sq_sum;
    }
}

/// Radial, angular and voxel projections plus run-level tallies for one
/// worker (or, after merging, for a whole run).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorGrid {
    layout: GridLayout,
    pub radial: ChannelSet,
    /// Radius × angle, row-major `r_bin * angular_bins + a_bin`.
    pub angular: ChannelSet,
    /// Row-major `ix * bins + iy`.
    pub voxel: ChannelSet,
    pub energy: EnergyTally,
    pub events: EventStats,
    /// Decay photon counts per keV bin; empty when the spectrum is disabled.
    pub spectrum: HistogramChannel,
}

impl AccumulatorGrid {
    pub fn new(layout: GridLayout) -> Self {
        let spectrum_bins = if layout.spectrum.enabled {
            layout.spectrum.bins
        } else {
            0
        };
        Self {
            layout,
            radial: ChannelSet::new(layout.radial.bins),
            angular: ChannelSet::new(layout.angular_len()),
            voxel: ChannelSet::new(layout.voxel.len()),
            energy: EnergyTally::default(),
            events: EventStats::default(),
            spectrum: HistogramChannel::new(spectrum_bins),
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn projection(&self, projection: Projection) -> &ChannelSet {
        match projection {
            Projection::Radial => &self.radial,
            Projection::Angular => &self.angular,
            Projection::Voxel => &self.voxel,
        }
    }

    pub fn projection_mut(&mut self, projection: Projection) -> &mut ChannelSet {
        match projection {
            Projection::Radial => &mut self.radial,
            Projection::Angular => &mut self.angular,
            Projection::Voxel => &mut self.voxel,
        }
    }

    /// Score one record into every selected projection it falls inside.
    ///
    /// Non-positive or non-finite energies and non-finite positions are
    /// dropped without touching any channel. A projection whose binning
    /// fails is skipped on its own; the others still fill.
    pub fn deposit(
        &mut self,
        record: &TransportStepRecord,
        projections: Projections,
    ) -> DepositOutcome {
        let mut outcome = DepositOutcome::default();
        if !record.is_scorable() {
            return outcome;
        }

        let verdict = classify(record.ancestry_depth, record.creator_process.as_ref());
        outcome.verdict = Some(verdict);

        let energy = record.energy_deposit;
        let position = record.position;
        self.energy.add(energy, verdict);

        let profiles_open =
            !self.layout.slab_filters_profiles || self.layout.voxel.in_slab(position[2]);
        let mass = record.mass_estimate(UNIT_CROSS_SECTION_CM2);
        let dose = energy / mass;

        // the angular table shares the radial axis, so both need a radial bin
        if profiles_open
            && mass > 0.0
            && dose.is_finite()
            && let Some(r_bin) = self.layout.radial.bin(planar_radius(position))
        {
            if projections.radial {
                self.radial.fill(r_bin, dose, verdict);
                outcome.radial = true;
            }
            if projections.angular
                && let Some(a_bin) = self.layout.angular.bin(polar_angle(position))
            {
                self.angular
                    .fill(self.layout.angular_flat(r_bin, a_bin), dose, verdict);
                outcome.angular = true;
            }
        }

        if projections.voxel
            && let Some((ix, iy)) = self.layout.voxel.bin(position)
        {
            self.voxel
                .fill(self.layout.voxel.flat(ix, iy), energy, verdict);
            outcome.voxel = true;
        }

        outcome
    }

    /// Close one event with its total deposited energy.
    pub fn record_event(&mut self, event_energy: f64) {
        self.events.record(event_energy);
    }

    /// Count one decay photon. Returns false when the spectrum is disabled
    /// or the energy falls outside it.
    pub fn fill_spectrum(&mut self, energy_kev: f64) -> bool {
        if !self.layout.spectrum.enabled {
            return false;
        }
        match self.layout.spectrum.bin(energy_kev) {
            Some(bin) => {
                self.spectrum.fill(bin, 1.0);
                true
            }
            None => false,
        }
    }

    /// Element-wise sum of `other` into `self`.
    pub fn merge(&mut self, other: &AccumulatorGrid) -> Result<(), LayoutMismatch> {
        if self.layout != other.layout {
            return Err(LayoutMismatch {
                what: "grid",
                expected: format!("{:?}", self.layout),
                found: format!("{:?}", other.layout),
            });
        }
        self.radial.merge_from(&other.radial)?;
        self.angular.merge_from(&other.angular)?;
        self.voxel.merge_from(&other.voxel)?;
        self.spectrum.merge_from(&other.spectrum)?;
        self.energy.merge(&other.energy);
        self.events.merge(&other.events);
        Ok(())
    }

    /// Verify channel sizes agree with the layout, e.g. after deserializing.
    pub fn check_shape(&self) -> Result<(), LayoutMismatch> {
        let spectrum_bins = if self.layout.spectrum.enabled {
            self.layout.spectrum.bins
        } else {
            0
        };
        let expected = [
            ("radial", self.layout.radial.bins, &self.radial),
            ("angular", self.layout.angular_len(), &self.angular),
            ("voxel", self.layout.voxel.len(), &self.voxel),
        ];
        for (what, bins, set) in expected {
            for channel in Channel::ALL {
                let found = set.channel(channel).len();
                if found != bins {
                    return Err(LayoutMismatch {
                        what,
                        expected: format!("{bins} bins"),
                        found: format!("{found} bins in {channel} channel"),
                    });
                }
            }
        }
        if self.spectrum.len() != spectrum_bins {
            return Err(LayoutMismatch {
                what: "spectrum",
                expected: format!("{spectrum_bins} bins"),
                found: format!("{} bins", self.spectrum.len()),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.energy.total_count == 0 && self.events.events == 0 && self.spectrum.total_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::record::CreatorProcess;
    use approx::assert_relative_eq;

    fn grid() -> AccumulatorGrid {
        AccumulatorGrid::new(GridLayout::default())
    }

    fn record(energy: f64, position: [f64; 3], depth: u32) -> TransportStepRecord {
        TransportStepRecord {
            step_length: 0.01,
            density: 1.0,
            ancestry_depth: depth,
            ..TransportStepRecord::new("Phantom", energy, position)
        }
    }

    fn assert_untouched(g: &AccumulatorGrid) {
        assert_eq!(g, &grid());
    }

    #[test]
    fn test_single_primary_deposit_lands_in_bin_zero() {
        let mut g = grid();
        let outcome = g.deposit(&record(1.0, [0.02, 0.0, 0.0], 0), Projections::ALL);
        assert_eq!(outcome.verdict, Some(Verdict::Primary));
        assert!(outcome.radial);

        assert!(g.radial.primary.value(0) > 0.0);
        assert_eq!(g.radial.primary.count(0), 1);
        assert_eq!(g.radial.primary.total_count(), 1);
        assert_eq!(g.radial.secondary.total_count(), 0);
        for bin in 1..g.radial.len() {
            assert_eq!(g.radial.primary.count(bin), 0);
            assert_eq!(g.radial.primary.value(bin), 0.0);
        }
    }

    #[test]
    fn test_dose_uses_unit_cross_section() {
        let mut g = grid();
        // mass = 2.0 g/cm³ × 0.5 cm × 0.01 cm² = 0.01 g
        let rec = TransportStepRecord {
            density: 2.0,
            step_length: 0.5,
            ..record(3.0, [1.0, 0.0, 0.0], 0)
        };
        g.deposit(&rec, Projections::ALL);
        let bin = g.layout().radial.bin(1.0).unwrap();
        assert_relative_eq!(g.radial.primary.value(bin), 300.0, max_relative = 1e-12);
        // voxel keeps raw energy
        let (ix, iy) = g.layout().voxel.bin([1.0, 0.0, 0.0]).unwrap();
        let flat = g.layout().voxel.flat(ix, iy);
        assert_relative_eq!(g.voxel.primary.value(flat), 3.0);
    }

    #[test]
    fn test_non_positive_energy_is_noop() {
        let mut g = grid();
        for energy in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let outcome = g.deposit(&record(energy, [0.1, 0.1, 0.0], 0), Projections::ALL);
            assert!(!outcome.accepted());
        }
        assert_untouched(&g);
    }

    #[test]
    fn test_non_finite_position_is_noop() {
        let mut g = grid();
        g.deposit(&record(1.0, [f64::NAN, 0.0, 0.0], 0), Projections::ALL);
        g.deposit(&record(1.0, [0.0, f64::INFINITY, 0.0], 0), Projections::ALL);
        assert_untouched(&g);
    }

    #[test]
    fn test_outside_radius_still_scores_voxel() {
        let mut g = grid();
        let rec = record(1.0, [4.5 + 0.001, 0.0, 0.0], 0);
        let outcome = g.deposit(&rec, Projections::ALL);
        assert!(!outcome.radial);
        assert!(!outcome.angular);
        assert!(outcome.voxel);
        assert_eq!(g.radial.total.total_count(), 0);
        assert_eq!(g.voxel.total.total_count(), 1);
        assert_eq!(g.voxel.primary.total_count(), 1);
    }

    #[test]
    fn test_outside_slab_skips_voxel_only() {
        let mut g = grid();
        let outcome = g.deposit(&record(1.0, [1.0, 1.0, 0.5], 0), Projections::ALL);
        assert!(outcome.radial);
        assert!(outcome.angular);
        assert!(!outcome.voxel);
    }

    #[test]
    fn test_slab_filters_profiles_when_enabled() {
        let config = ScoringConfig {
            slab_filters_profiles: true,
            ..ScoringConfig::default()
        };
        let mut g = AccumulatorGrid::new(config.layout());
        let outcome = g.deposit(&record(1.0, [1.0, 1.0, 0.5], 0), Projections::ALL);
        assert!(outcome.accepted());
        assert!(!outcome.landed_anywhere());
        let outcome = g.deposit(&record(1.0, [1.0, 1.0, 0.1], 0), Projections::ALL);
        assert!(outcome.radial && outcome.angular && outcome.voxel);
    }

    #[test]
    fn test_zero_mass_skips_profiles() {
        let mut g = grid();
        let rec = TransportStepRecord {
            step_length: 0.0,
            ..record(1.0, [0.5, 0.5, 0.0], 0)
        };
        let outcome = g.deposit(&rec, Projections::ALL);
        assert!(!outcome.radial);
        assert!(!outcome.angular);
        assert!(outcome.voxel);
    }

    #[test]
    fn test_selected_projections_only() {
        let mut g = grid();
        let outcome = g.deposit(
            &record(1.0, [0.5, 0.5, 0.0], 0),
            Projections::only(Projection::Voxel),
        );
        assert!(!outcome.radial && !outcome.angular && outcome.voxel);
        assert_eq!(g.radial.total.total_count(), 0);
        // tally still counts the accepted record
        assert_eq!(g.energy.total_count, 1);
    }

    #[test]
    fn test_total_equals_primary_plus_secondary_counts() {
        let mut g = grid();
        let processes = [
            None,
            Some(CreatorProcess::Compton),
            Some(CreatorProcess::Bremsstrahlung),
        ];
        for i in 0..300u32 {
            let x = (i as f64 * 0.037) % 8.0 - 4.0;
            let y = (i as f64 * 0.061) % 8.0 - 4.0;
            let rec = TransportStepRecord {
                creator_process: processes[i as usize % 3].clone(),
                ..record(0.1 + i as f64 * 1e-3, [x, y, 0.0], i % 9)
            };
            g.deposit(&rec, Projections::ALL);
        }
        for projection in Projection::ALL {
            let set = g.projection(projection);
            assert_eq!(
                set.total.total_count(),
                set.primary.total_count() + set.secondary.total_count(),
                "{projection}"
            );
            for bin in 0..set.len() {
                assert_eq!(set.total.count(bin), set.primary.count(bin) + set.secondary.count(bin));
            }
        }
        assert_eq!(
            g.energy.total_count,
            g.energy.primary_count + g.energy.secondary_count
        );
        assert!(g.energy.secondary_count > 0);
    }

    #[test]
    fn test_merge_sums_everything() {
        let mut a = grid();
        let mut b = grid();
        a.deposit(&record(2.0, [0.0, 0.0, 0.0], 0), Projections::ALL);
        b.deposit(&record(2.0, [0.0, 0.0, 0.0], 0), Projections::ALL);
        a.record_event(2.0);
        b.record_event(2.0);
        b.fill_spectrum(317.0);

        a.merge(&b).unwrap();
        let (ix, iy) = a.layout().voxel.bin([0.0, 0.0, 0.0]).unwrap();
        let flat = a.layout().voxel.flat(ix, iy);
        assert_relative_eq!(a.voxel.primary.value(flat), 4.0);
        assert_relative_eq!(a.voxel.total.value(flat), 4.0);
        assert_eq!(a.voxel.total.count(flat), 2);
        assert_eq!(a.events.events, 2);
        assert_relative_eq!(a.energy.primary, 4.0);
        assert_eq!(a.spectrum.total_count(), 1);
    }

    #[test]
    fn test_merge_rejects_different_layout() {
        let mut a = grid();
        let config = ScoringConfig {
            radial: crate::binning::RadialBinning {
                bins: 45,
                max_radius_cm: 4.5,
            },
            ..ScoringConfig::default()
        };
        let b = AccumulatorGrid::new(config.layout());
        let err = a.merge(&b).unwrap_err();
        assert_eq!(err.what, "grid");
    }

    #[test]
    fn test_event_rms() {
        let mut stats = EventStats::default();
        assert_eq!(stats.rms(), 0.0);
        for e in [1.0, 2.0, 3.0] {
            stats.record(e);
        }
        // Σe² − (Σe)²/n = 14 − 12 = 2
        assert_relative_eq!(stats.rms(), 2.0_f64.sqrt());
        assert_relative_eq!(stats.mean(), 2.0);
    }

    #[test]
    fn test_spectrum_disabled() {
        let config = ScoringConfig {
            spectrum: crate::binning::SpectrumBinning {
                enabled: false,
                ..Default::default()
            },
            ..ScoringConfig::default()
        };
        let mut g = AccumulatorGrid::new(config.layout());
        assert!(!g.fill_spectrum(100.0));
        assert!(g.spectrum.is_empty());
        g.check_shape().unwrap();
    }

    #[test]
    fn test_angular_table_keyed_by_radius() {
        let mut g = grid();
        let near = g.deposit(&record(1.0, [0.52, 0.0, 0.0], 0), Projections::ALL);
        let mid = g.deposit(&record(1.0, [2.02, 0.0, 0.0], 0), Projections::ALL);
        let far = g.deposit(&record(1.0, [50.0, 0.0, 0.0], 0), Projections::ALL);
        assert!(near.angular && mid.angular);
        assert!(!far.radial && !far.angular && !far.voxel);

        let layout = *g.layout();
        assert_eq!(g.angular.len(), 90 * 18);
        // both sit at theta = 90 degrees but in different radial rows
        assert_eq!(g.angular.total.count(layout.angular_flat(10, 9)), 1);
        assert_eq!(g.angular.total.count(layout.angular_flat(40, 9)), 1);
        assert_eq!(g.angular.total.total_count(), 2);
        assert_eq!(layout.angular_unflat(layout.angular_flat(40, 9)), (40, 9));
    }

    #[test]
    fn test_angular_only_still_needs_radial_bin() {
        let mut g = grid();
        let only = Projections::only(Projection::Angular);
        assert!(!g.deposit(&record(1.0, [0.0, 4.6, 1.0], 0), only).angular);
        assert!(g.deposit(&record(1.0, [0.0, 4.4, 1.0], 0), only).angular);
        assert_eq!(g.radial.total.total_count(), 0);
        assert_eq!(g.angular.total.total_count(), 1);
    }

    #[test]
    fn test_check_shape_detects_truncation() {
        let mut g = grid();
        g.check_shape().unwrap();
        g.angular.secondary = HistogramChannel::new(3);
        let err = g.check_shape().unwrap_err();
        assert_eq!(err.what, "angular");
    }
}
