/// Nominal cross-sectional area of a step's mass estimate: 1 mm² in cm².
pub const UNIT_CROSS_SECTION_CM2: f64 = 0.01;

/// Energy conversion at the ASCII export boundary.
pub const KEV_PER_MEV: f64 = 1000.0;

/// Deepest lineage generation that can still score as primary (via Compton
/// or photoelectric creation). Anything deeper is always secondary.
pub const MAX_PRIMARY_DEPTH: u32 = 5;

/// Radial profile: 90 bins of 0.05 cm over [0, 4.5) cm.
pub const DEFAULT_RADIAL_BINS: usize = 90;
pub const DEFAULT_MAX_RADIUS_CM: f64 = 4.5;

/// Angular profile: 18 bins of 10° over [0, π).
pub const DEFAULT_ANGULAR_BINS: usize = 18;

/// Voxel map: 180 × 180 bins of 0.1 cm over [-9, 9) cm, same as the
/// reference scoring mesh.
pub const DEFAULT_VOXEL_BINS: usize = 180;
pub const DEFAULT_VOXEL_HALF_WIDTH_CM: f64 = 9.0;

/// Longitudinal slab of the reference mesh: z ∈ [-0.125, 0.125] cm.
pub const DEFAULT_SLAB_HALF_WIDTH_CM: f64 = 0.125;

/// Decay photon spectrum: 800 bins of 1 keV.
pub const DEFAULT_SPECTRUM_BINS: usize = 800;
pub const DEFAULT_SPECTRUM_MAX_KEV: f64 = 800.0;

/// Volume name of the water phantom in the reference geometry.
pub const DEFAULT_SCORING_VOLUME: &str = "Phantom";
