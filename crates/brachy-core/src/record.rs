//! Transport-step records as handed over by the transport engine.
//!
//! Units: energies in MeV, lengths in cm, densities in g/cm³.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process that created a track, keyed by the transport engine's process name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CreatorProcess {
    Compton,
    Photoelectric,
    PairProduction,
    Rayleigh,
    RadioactiveDecay,
    Ionisation,
    Bremsstrahlung,
    Other(String),
}

impl CreatorProcess {
    /// Parse an engine process tag. Unrecognized tags are kept verbatim.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "compt" => CreatorProcess::Compton,
            "phot" => CreatorProcess::Photoelectric,
            "conv" => CreatorProcess::PairProduction,
            "Rayl" => CreatorProcess::Rayleigh,
            "RadioactiveDecay" | "Radioactivation" => CreatorProcess::RadioactiveDecay,
            "eIoni" => CreatorProcess::Ionisation,
            "eBrem" => CreatorProcess::Bremsstrahlung,
            other => CreatorProcess::Other(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            CreatorProcess::Compton => "compt",
            CreatorProcess::Photoelectric => "phot",
            CreatorProcess::PairProduction => "conv",
            CreatorProcess::Rayleigh => "Rayl",
            CreatorProcess::RadioactiveDecay => "RadioactiveDecay",
            CreatorProcess::Ionisation => "eIoni",
            CreatorProcess::Bremsstrahlung => "eBrem",
            CreatorProcess::Other(tag) => tag,
        }
    }

    /// Photon interactions whose first-generation products score as primary.
    pub fn is_photon_interaction(&self) -> bool {
        matches!(
            self,
            CreatorProcess::Compton
                | CreatorProcess::Photoelectric
                | CreatorProcess::PairProduction
                | CreatorProcess::Rayleigh
        )
    }

    /// The narrower set that keeps deeper generations primary.
    pub fn is_direct_absorption(&self) -> bool {
        matches!(self, CreatorProcess::Compton | CreatorProcess::Photoelectric)
    }
}

impl From<String> for CreatorProcess {
    fn from(tag: String) -> Self {
        CreatorProcess::from_tag(&tag)
    }
}

impl From<CreatorProcess> for String {
    fn from(process: CreatorProcess) -> Self {
        process.as_tag().to_string()
    }
}

impl fmt::Display for CreatorProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A particle produced during a step, reported once the parent track has died.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecondaryParticle {
    pub particle: String,
    #[serde(default)]
    pub creator_process: Option<CreatorProcess>,
    /// Kinetic energy in MeV.
    pub kinetic_energy: f64,
}

impl SecondaryParticle {
    pub fn is_decay_photon(&self) -> bool {
        self.particle == "gamma"
            && matches!(self.creator_process, Some(CreatorProcess::RadioactiveDecay))
    }
}

/// One transport step. Consumed immediately by ingestion, never retained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportStepRecord {
    #[serde(default)]
    pub event_id: u64,
    /// Deposited energy in MeV.
    pub energy_deposit: f64,
    /// Pre-step position in cm.
    pub position: [f64; 3],
    /// Step length in cm.
    pub step_length: f64,
    /// Local material density in g/cm³.
    pub density: f64,
    /// Generations removed from the source particle (0 = source particle).
    pub ancestry_depth: u32,
    #[serde(default)]
    pub creator_process: Option<CreatorProcess>,
    /// Geometric volume the pre-step point lies in.
    #[serde(default)]
    pub volume: String,
    #[serde(default = "default_alive")]
    pub track_alive: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondaries: Vec<SecondaryParticle>,
}

fn default_alive() -> bool {
    true
}

impl TransportStepRecord {
    /// Minimal alive record in the given volume; remaining fields are zeroed.
    pub fn new(volume: &str, energy_deposit: f64, position: [f64; 3]) -> Self {
        Self {
            event_id: 0,
            energy_deposit,
            position,
            step_length: 0.0,
            density: 0.0,
            ancestry_depth: 0,
            creator_process: None,
            volume: volume.to_string(),
            track_alive: true,
            secondaries: Vec::new(),
        }
    }

    /// Whether the record can contribute to any statistic at all.
    /// Zero-energy steps are the common case and are not an error.
    pub fn is_scorable(&self) -> bool {
        self.energy_deposit > 0.0
            && self.energy_deposit.is_finite()
            && self.position.iter().all(|c| c.is_finite())
    }

    /// Approximate mass of the step volume in grams: ρ · ℓ · A.
    pub fn mass_estimate(&self, cross_section_cm2: f64) -> f64 {
        self.density * self.step_length * cross_section_cm2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_tags_roundtrip() {
        for tag in ["compt", "phot", "conv", "Rayl", "RadioactiveDecay", "eIoni", "eBrem"] {
            assert_eq!(CreatorProcess::from_tag(tag).as_tag(), tag);
        }
        let other = CreatorProcess::from_tag("msc");
        assert_eq!(other, CreatorProcess::Other("msc".to_string()));
        assert_eq!(other.to_string(), "msc");
    }

    #[test]
    fn test_record_defaults_from_json() {
        let json = r#"{
            "energy_deposit": 0.5,
            "position": [0.1, 0.2, 0.0],
            "step_length": 0.01,
            "density": 1.0,
            "ancestry_depth": 1,
            "creator_process": "compt",
            "volume": "Phantom"
        }"#;
        let rec: TransportStepRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.event_id, 0);
        assert!(rec.track_alive);
        assert!(rec.secondaries.is_empty());
        assert_eq!(rec.creator_process, Some(CreatorProcess::Compton));
    }

    #[test]
    fn test_scorable() {
        let mut rec = TransportStepRecord::new("Phantom", 1.0, [0.0, 0.0, 0.0]);
        assert!(rec.is_scorable());
        rec.energy_deposit = 0.0;
        assert!(!rec.is_scorable());
        rec.energy_deposit = -1.0;
        assert!(!rec.is_scorable());
        rec.energy_deposit = 1.0;
        rec.position[1] = f64::NAN;
        assert!(!rec.is_scorable());
        rec.position[1] = f64::INFINITY;
        assert!(!rec.is_scorable());
    }

    #[test]
    fn test_decay_photon() {
        let photon = SecondaryParticle {
            particle: "gamma".to_string(),
            creator_process: Some(CreatorProcess::RadioactiveDecay),
            kinetic_energy: 0.317,
        };
        assert!(photon.is_decay_photon());

        let electron = SecondaryParticle {
            particle: "e-".to_string(),
            ..photon.clone()
        };
        assert!(!electron.is_decay_photon());

        let compton_photon = SecondaryParticle {
            creator_process: Some(CreatorProcess::Compton),
            ..photon
        };
        assert!(!compton_photon.is_decay_photon());
    }
}
