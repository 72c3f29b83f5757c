//! Dose accumulation and lineage classification for brachytherapy transport
//! steps.
//!
//! Each worker folds its share of the step stream into its own
//! [`AccumulatorGrid`]: radial and angular dose profiles plus a sparse
//! Cartesian energy map, every projection split into primary, secondary and
//! total channels. A [`RunAggregator`] merges the worker grids once at the
//! end of a run.
//!
//! Zero I/O. Persistence and file output live in `brachy-store`.

pub mod aggregate;
pub mod binning;
pub mod classify;
pub mod config;
pub mod constants;
pub mod export;
pub mod grid;
pub mod histogram;
pub mod ingest;
pub mod record;
pub mod snapshot;
pub mod synth;

pub use aggregate::{RunAggregator, RunError};
pub use binning::{
    AngularBinning, RadialBinning, SpectrumBinning, VoxelBinning, planar_radius, polar_angle,
};
pub use classify::{Verdict, classify};
pub use config::{ConfigError, GridLayout, ScoringConfig};
pub use constants::{KEV_PER_MEV, MAX_PRIMARY_DEPTH, UNIT_CROSS_SECTION_CM2};
pub use export::{
    AngularRow, DoseSummary, EnergyUnit, RadialRow, SpectrumRow, VoxelRow, angular_rows,
    format_angular_table, format_radial_table, format_spectrum, format_summary, format_voxel_map,
    radial_rows, spectrum_rows, summary, voxel_rows,
};
pub use grid::{AccumulatorGrid, DepositOutcome, EnergyTally, EventStats, Projection, Projections};
pub use histogram::{Channel, ChannelSet, HistogramChannel, LayoutMismatch};
pub use ingest::{EventIngest, IngestStats, VolumeSelector};
pub use record::{CreatorProcess, SecondaryParticle, TransportStepRecord};
pub use snapshot::{CURRENT_VERSION, RunSnapshot, export_json, import_json};
pub use synth::SynthParams;
