//! Scoring configuration. Every field has a default matching the reference
//! HDR phantom setup, so an empty document is a valid configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binning::{AngularBinning, RadialBinning, SpectrumBinning, VoxelBinning};
use crate::constants::DEFAULT_SCORING_VOLUME;
use crate::ingest::VolumeSelector;

#[derive(Debug)]
pub enum ConfigError {
    InvalidBinning(String),
    InvalidPattern(regex::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBinning(msg) => write!(f, "invalid binning: {msg}"),
            ConfigError::InvalidPattern(e) => write!(f, "invalid scoring volume pattern: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<regex::Error> for ConfigError {
    fn from(e: regex::Error) -> Self {
        ConfigError::InvalidPattern(e)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Regular expression that must match the whole volume name.
    pub scoring_volume: String,
    /// Apply the voxel slab window to the radial and angular profiles as well.
    pub slab_filters_profiles: bool,
    pub radial: RadialBinning,
    pub angular: AngularBinning,
    pub voxel: VoxelBinning,
    pub spectrum: SpectrumBinning,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scoring_volume: DEFAULT_SCORING_VOLUME.to_string(),
            slab_filters_profiles: false,
            radial: RadialBinning::default(),
            angular: AngularBinning::default(),
            voxel: VoxelBinning::default(),
            spectrum: SpectrumBinning::default(),
        }
    }
}

/// Everything that determines the shape and filling rules of a grid.
/// Two grids can only be merged when their layouts are equal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub radial: RadialBinning,
    pub angular: AngularBinning,
    pub voxel: VoxelBinning,
    pub spectrum: SpectrumBinning,
    pub slab_filters_profiles: bool,
}

impl Default for GridLayout {
    fn default() -> Self {
        ScoringConfig::default().layout()
    }
}

impl GridLayout {
    /// The angular table is radius × angle: one row of angular bins per
    /// radial bin.
    pub fn angular_len(&self) -> usize {
        self.radial.bins * self.angular.bins
    }

    /// Row-major `r_bin * angular_bins + a_bin`.
    pub fn angular_flat(&self, r_bin: usize, a_bin: usize) -> usize {
        r_bin * self.angular.bins + a_bin
    }

    pub fn angular_unflat(&self, idx: usize) -> (usize, usize) {
        (idx / self.angular.bins, idx % self.angular.bins)
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidBinning(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn nonzero(name: &str, bins: usize) -> Result<(), ConfigError> {
    if bins == 0 {
        Err(ConfigError::InvalidBinning(format!("{name} must be at least 1")))
    } else {
        Ok(())
    }
}

impl ScoringConfig {
    pub fn layout(&self) -> GridLayout {
        GridLayout {
            radial: self.radial,
            angular: self.angular,
            voxel: self.voxel,
            spectrum: self.spectrum,
            slab_filters_profiles: self.slab_filters_profiles,
        }
    }

    pub fn volume_selector(&self) -> Result<VolumeSelector, ConfigError> {
        Ok(VolumeSelector::new(&self.scoring_volume)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("radial.bins", self.radial.bins)?;
        positive("radial.max_radius_cm", self.radial.max_radius_cm)?;
        nonzero("angular.bins", self.angular.bins)?;
        nonzero("voxel.bins", self.voxel.bins)?;
        positive("voxel.half_width_cm", self.voxel.half_width_cm)?;
        // a zero-thickness slab is legal: it scores the z = 0 plane only
        if !(self.voxel.slab_half_width_cm.is_finite() && self.voxel.slab_half_width_cm >= 0.0) {
            return Err(ConfigError::InvalidBinning(format!(
                "voxel.slab_half_width_cm must be non-negative and finite, got {}",
                self.voxel.slab_half_width_cm
            )));
        }
        if self.spectrum.enabled {
            nonzero("spectrum.bins", self.spectrum.bins)?;
            positive("spectrum.max_kev", self.spectrum.max_kev)?;
        }
        self.volume_selector()?;
        Ok(())
    }
}
