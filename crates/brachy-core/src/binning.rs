//! Coordinate-to-bin mappings for the three projections.
//!
//! Each binning is an independent pure function of the deposit position.
//! `None` means the deposit falls outside that projection only.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_ANGULAR_BINS, DEFAULT_MAX_RADIUS_CM, DEFAULT_RADIAL_BINS,
    DEFAULT_SLAB_HALF_WIDTH_CM, DEFAULT_SPECTRUM_BINS, DEFAULT_SPECTRUM_MAX_KEV,
    DEFAULT_VOXEL_BINS, DEFAULT_VOXEL_HALF_WIDTH_CM,
};

/// Distance from the source axis in the scoring (x, y) plane.
pub fn planar_radius(position: [f64; 3]) -> f64 {
    position[0].hypot(position[1])
}

/// Polar angle from the +z source axis, in [0, π]. Zero at the origin.
pub fn polar_angle(position: [f64; 3]) -> f64 {
    let [x, y, z] = position;
    if x == 0.0 && y == 0.0 && z == 0.0 {
        return 0.0;
    }
    x.hypot(y).atan2(z)
}

/// `floor(value / max * bins)` for `0 ≤ value ≤ max`, if the index is in range.
fn uniform_index(value: f64, max: f64, bins: usize) -> Option<usize> {
    if !(0.0..=max).contains(&value) {
        return None;
    }
    let idx = (value / max * bins as f64).floor();
    if idx < bins as f64 {
        Some(idx as usize)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialBinning {
    pub bins: usize,
    pub max_radius_cm: f64,
}

impl Default for RadialBinning {
    fn default() -> Self {
        Self {
            bins: DEFAULT_RADIAL_BINS,
            max_radius_cm: DEFAULT_MAX_RADIUS_CM,
        }
    }
}

impl RadialBinning {
    pub fn bin(&self, radius: f64) -> Option<usize> {
        uniform_index(radius, self.max_radius_cm, self.bins)
    }

    pub fn width(&self) -> f64 {
        self.max_radius_cm / self.bins as f64
    }

    pub fn center(&self, idx: usize) -> f64 {
        (idx as f64 + 0.5) * self.width()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AngularBinning {
    pub bins: usize,
}

impl Default for AngularBinning {
    fn default() -> Self {
        Self {
            bins: DEFAULT_ANGULAR_BINS,
        }
    }
}

impl AngularBinning {
    pub fn bin(&self, theta: f64) -> Option<usize> {
        uniform_index(theta, PI, self.bins)
    }

    pub fn width(&self) -> f64 {
        PI / self.bins as f64
    }

    /// Bin centre in radians.
    pub fn center(&self, idx: usize) -> f64 {
        (idx as f64 + 0.5) * self.width()
    }
}

/// Square x/y grid of `bins × bins` over [-W, W), restricted to a thin
/// longitudinal slab |z| ≤ δ.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelBinning {
    pub bins: usize,
    pub half_width_cm: f64,
    pub slab_half_width_cm: f64,
}

impl Default for VoxelBinning {
    fn default() -> Self {
        Self {
            bins: DEFAULT_VOXEL_BINS,
            half_width_cm: DEFAULT_VOXEL_HALF_WIDTH_CM,
            slab_half_width_cm: DEFAULT_SLAB_HALF_WIDTH_CM,
        }
    }
}

impl VoxelBinning {
    pub fn width(&self) -> f64 {
        2.0 * self.half_width_cm / self.bins as f64
    }

    pub fn in_slab(&self, z: f64) -> bool {
        (-self.slab_half_width_cm..=self.slab_half_width_cm).contains(&z)
    }

    fn axis_index(&self, coord: f64) -> Option<usize> {
        let idx = ((coord - (-self.half_width_cm)) / self.width()).floor();
        if idx >= 0.0 && idx < self.bins as f64 {
            Some(idx as usize)
        } else {
            None
        }
    }

    /// `(ix, iy)` for a position inside the slab and the x/y window.
    pub fn bin(&self, position: [f64; 3]) -> Option<(usize, usize)> {
        if !self.in_slab(position[2]) {
            return None;
        }
        Some((self.axis_index(position[0])?, self.axis_index(position[1])?))
    }

    /// Row-major flat index of `(ix, iy)`.
    pub fn flat(&self, ix: usize, iy: usize) -> usize {
        ix * self.bins + iy
    }

    pub fn unflat(&self, idx: usize) -> (usize, usize) {
        (idx / self.bins, idx % self.bins)
    }

    pub fn len(&self) -> usize {
        self.bins * self.bins
    }

    pub fn is_empty(&self) -> bool {
        self.bins == 0
    }

    pub fn center(&self, ix: usize, iy: usize) -> (f64, f64) {
        let w = self.width();
        (
            -self.half_width_cm + (ix as f64 + 0.5) * w,
            -self.half_width_cm + (iy as f64 + 0.5) * w,
        )
    }
}

/// Energy binning of the decay photon spectrum, in keV.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumBinning {
    pub enabled: bool,
    pub bins: usize,
    pub max_kev: f64,
}

impl Default for SpectrumBinning {
    fn default() -> Self {
        Self {
            enabled: true,
            bins: DEFAULT_SPECTRUM_BINS,
            max_kev: DEFAULT_SPECTRUM_MAX_KEV,
        }
    }
}

impl SpectrumBinning {
    /// Half-open [0, max) like a fixed-width H1.
    pub fn bin(&self, energy_kev: f64) -> Option<usize> {
        if energy_kev < self.max_kev {
            uniform_index(energy_kev, self.max_kev, self.bins)
        } else {
            None
        }
    }

    pub fn center(&self, idx: usize) -> f64 {
        (idx as f64 + 0.5) * self.max_kev / self.bins as f64
    }
}
