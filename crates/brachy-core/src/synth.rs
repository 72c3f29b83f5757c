//! Synthetic point-source step streams for smoke runs and benchmarks.
//!
//! Not physics: steps are scattered isotropically around the origin with an
//! exponential range, lineage depth grows along each history, and every
//! history ends with a stopped source track that may emit decay photons.

use std::f64::consts::TAU;

use rand::Rng;

use crate::record::{CreatorProcess, SecondaryParticle, TransportStepRecord};

/// Ir-192 gamma lines (MeV) used for synthetic decay photons.
const DECAY_LINES_MEV: [f64; 5] = [0.296, 0.308, 0.317, 0.468, 0.604];

const PROCESSES: [&str; 6] = ["compt", "phot", "Rayl", "eIoni", "eBrem", "conv"];

#[derive(Clone, Debug)]
pub struct SynthParams {
    pub events: u64,
    pub steps_per_event: usize,
    /// Mean distance of a step from the source, cm.
    pub mean_range_cm: f64,
    pub volume: String,
    pub density: f64,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            events: 100,
            steps_per_event: 20,
            mean_range_cm: 1.5,
            volume: "Phantom".to_string(),
            density: 1.0,
        }
    }
}

/// One history: `steps_per_event` scoring steps plus a final stopped source
/// step outside the phantom.
pub fn event(event_id: u64, params: &SynthParams, rng: &mut impl Rng) -> Vec<TransportStepRecord> {
    let mut steps = Vec::with_capacity(params.steps_per_event + 1);
    let mut depth = 0u32;
    for _ in 0..params.steps_per_event {
        let creator = if depth == 0 {
            None
        } else {
            Some(CreatorProcess::from_tag(
                PROCESSES[rng.random_range(0..PROCESSES.len())],
            ))
        };
        steps.push(TransportStepRecord {
            event_id,
            step_length: rng.random_range(0.001..0.05),
            density: params.density,
            ancestry_depth: depth,
            creator_process: creator,
            ..TransportStepRecord::new(
                &params.volume,
                rng.random_range(0.0005..0.05),
                isotropic_point(params.mean_range_cm, rng),
            )
        });
        if rng.random_bool(0.3) {
            depth += 1;
        }
    }

    let photons = rng.random_range(0..3);
    steps.push(TransportStepRecord {
        event_id,
        track_alive: false,
        secondaries: (0..photons)
            .map(|_| SecondaryParticle {
                particle: "gamma".to_string(),
                creator_process: Some(CreatorProcess::RadioactiveDecay),
                kinetic_energy: DECAY_LINES_MEV[rng.random_range(0..DECAY_LINES_MEV.len())],
            })
            .collect(),
        ..TransportStepRecord::new("Source", 0.0, [0.0, 0.0, 0.0])
    });
    steps
}

/// The whole stream, event ids `0..events`.
pub fn stream(params: &SynthParams, rng: &mut impl Rng) -> Vec<TransportStepRecord> {
    (0..params.events)
        .flat_map(|id| event(id, params, rng))
        .collect()
}

fn isotropic_point(mean_range_cm: f64, rng: &mut impl Rng) -> [f64; 3] {
    let r = -mean_range_cm * (1.0 - rng.random::<f64>()).ln();
    let cos_theta: f64 = rng.random_range(-1.0..=1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
    let phi = TAU * rng.random::<f64>();
    [
        r * sin_theta * phi.cos(),
        r * sin_theta * phi.sin(),
        r * cos_theta,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_stream_shape() {
        let mut rng = SmallRng::seed_from_u64(42);
        let params = SynthParams {
            events: 5,
            steps_per_event: 4,
            ..SynthParams::default()
        };
        let steps = stream(&params, &mut rng);
        assert_eq!(steps.len(), 25);
        assert_eq!(steps.iter().filter(|s| !s.track_alive).count(), 5);
        assert!(steps.windows(2).all(|w| w[0].event_id <= w[1].event_id));
        assert!(
            steps
                .iter()
                .filter(|s| s.track_alive)
                .all(|s| s.is_scorable() && s.volume == "Phantom")
        );
    }

    #[test]
    fn test_seeded_stream_is_reproducible() {
        let params = SynthParams::default();
        let a = stream(&params, &mut SmallRng::seed_from_u64(7));
        let b = stream(&params, &mut SmallRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_first_step_is_source_generated() {
        let mut rng = SmallRng::seed_from_u64(1);
        let steps = event(0, &SynthParams::default(), &mut rng);
        assert_eq!(steps[0].ancestry_depth, 0);
        assert!(steps[0].creator_process.is_none());
    }
}
