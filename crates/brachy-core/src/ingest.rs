//! Step-by-step ingestion for one worker.
//!
//! `EventIngest` borrows the worker's grid for the duration of a fold over
//! that worker's records. It holds only the running energy of the event in
//! progress; everything persistent lives in the grid.

use regex::Regex;

use crate::config::{ConfigError, ScoringConfig};
use crate::constants::KEV_PER_MEV;
use crate::grid::{AccumulatorGrid, Projections};
use crate::record::TransportStepRecord;

/// Matches volume names against a pattern that must cover the whole name.
#[derive(Clone, Debug)]
pub enum VolumeSelector {
    Any,
    Pattern(Regex),
}

impl VolumeSelector {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(VolumeSelector::Pattern(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    /// Selector that accepts every volume.
    pub fn any() -> Self {
        VolumeSelector::Any
    }

    pub fn matches(&self, volume: &str) -> bool {
        match self {
            VolumeSelector::Any => true,
            VolumeSelector::Pattern(re) => re.is_match(volume),
        }
    }
}

/// Counters for one ingestion pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub seen: u64,
    pub outside_volume: u64,
    pub rejected: u64,
    pub deposited: u64,
    pub unbinned: u64,
    pub events: u64,
    pub spectrum_photons: u64,
}

impl IngestStats {
    pub fn merge(&mut self, other: &IngestStats) {
        self.seen += other.seen;
        self.outside_volume += other.outside_volume;
        self.rejected += other.rejected;
        self.deposited += other.deposited;
        self.unbinned += other.unbinned;
        self.events += other.events;
        self.spectrum_photons += other.spectrum_photons;
    }
}

struct OpenEvent {
    id: u64,
    energy: f64,
}

pub struct EventIngest<'g> {
    grid: &'g mut AccumulatorGrid,
    selector: VolumeSelector,
    projections: Projections,
    open: Option<OpenEvent>,
    stats: IngestStats,
}

impl<'g> EventIngest<'g> {
    pub fn new(grid: &'g mut AccumulatorGrid, selector: VolumeSelector) -> Self {
        Self {
            grid,
            selector,
            projections: Projections::ALL,
            open: None,
            stats: IngestStats::default(),
        }
    }

    pub fn from_config(
        grid: &'g mut AccumulatorGrid,
        config: &ScoringConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(grid, config.volume_selector()?))
    }

    pub fn with_projections(mut self, projections: Projections) -> Self {
        self.projections = projections;
        self
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Feed one transport step.
    pub fn process(&mut self, record: &TransportStepRecord) {
        self.stats.seen += 1;
        self.advance_event(record.event_id);

        if !record.track_alive {
            self.scan_secondaries(record);
        }

        if !self.selector.matches(&record.volume) {
            self.stats.outside_volume += 1;
            return;
        }

        let outcome = self.grid.deposit(record, self.projections);
        if !outcome.accepted() {
            self.stats.rejected += 1;
            return;
        }
        self.stats.deposited += 1;
        if !outcome.landed_anywhere() {
            self.stats.unbinned += 1;
        }
        if let Some(open) = self.open.as_mut() {
            open.energy += record.energy_deposit;
        }
    }

    pub fn process_all<'r, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'r TransportStepRecord>,
    {
        for record in records {
            self.process(record);
        }
    }

    /// Close the event in progress and return the counters for this pass.
    pub fn finish(mut self) -> IngestStats {
        self.close_event();
        self.stats
    }

    fn advance_event(&mut self, event_id: u64) {
        match &self.open {
            Some(open) if open.id == event_id => {}
            _ => {
                self.close_event();
                self.open = Some(OpenEvent {
                    id: event_id,
                    energy: 0.0,
                });
            }
        }
    }

    fn close_event(&mut self) {
        if let Some(open) = self.open.take() {
            self.grid.record_event(open.energy);
            self.stats.events += 1;
        }
    }

    /// Decay photons emitted by a track that just stopped. Independent of
    /// the scoring volume and of dose accumulation.
    fn scan_secondaries(&mut self, record: &TransportStepRecord) {
        for secondary in record.secondaries.iter().filter(|s| s.is_decay_photon()) {
            if self.grid.fill_spectrum(secondary.kinetic_energy * KEV_PER_MEV) {
                self.stats.spectrum_photons += 1;
            }
        }
    }
}

impl Drop for EventIngest<'_> {
    fn drop(&mut self) {
        self.close_event();
    }
}
