//! Primary/secondary lineage classification.
//!
//! PRIMARY covers source photons and the immediate Compton/photoelectric
//! products that carry most of the dose; SECONDARY covers multiply scattered
//! photons and their descendants. The rules are a flat guarded match and the
//! first matching arm wins.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PRIMARY_DEPTH;
use crate::record::CreatorProcess;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Primary,
    Secondary,
}

impl Verdict {
    pub fn is_primary(self) -> bool {
        self == Verdict::Primary
    }
}

/// Classify a deposit by the depositing track's ancestry depth and creator.
pub fn classify(ancestry_depth: u32, creator: Option<&CreatorProcess>) -> Verdict {
    match (ancestry_depth, creator) {
        // Emitted by the source itself.
        (0, _) => Verdict::Primary,
        // First-generation products of source photons.
        (1, Some(p)) if p.is_photon_interaction() => Verdict::Primary,
        // Unknown or missing creator at depth 1 resolves to primary.
        (1, _) => Verdict::Primary,
        (2..=MAX_PRIMARY_DEPTH, Some(p)) if p.is_direct_absorption() => Verdict::Primary,
        _ => Verdict::Secondary,
    }
}
