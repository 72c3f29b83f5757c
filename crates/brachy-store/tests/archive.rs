//! Archive and export across crate boundaries: ingest a synthetic run,
//! persist it to an on-disk archive, reopen, and export from the copy.

use std::fs;

use brachy_core::{
    Channel, EnergyUnit, EventIngest, RunAggregator, ScoringConfig, SynthParams, radial_rows,
    summary, synth,
};
use brachy_store::{RunArchive, export_run, parse_config};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn merged_run(config: &ScoringConfig, workers: usize) -> brachy_core::AccumulatorGrid {
    let params = SynthParams {
        events: 40,
        ..SynthParams::default()
    };
    let steps = synth::stream(&params, &mut SmallRng::seed_from_u64(11));
    let mut run = RunAggregator::with_workers(config.layout(), workers);
    for (w, grid) in run.workers_mut().iter_mut().enumerate() {
        let mut ingest = EventIngest::from_config(grid, config).unwrap();
        ingest.process_all(steps.iter().filter(|s| s.event_id as usize % workers == w));
    }
    run.merge_all().unwrap().clone()
}

#[test]
fn archive_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = parse_config("[radial]\nbins = 30\nmax_radius_cm = 3.0\n").unwrap();
    let grid = merged_run(&config, 3);

    let id = {
        let archive = RunArchive::open_dir(dir.path()).unwrap();
        archive.save_run("reopen", &config, &grid, 3).unwrap().id
    };

    let archive = RunArchive::open_dir(dir.path()).unwrap();
    let runs = archive.list_runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].workers, 3);
    assert_eq!(runs[0].events, 40);

    let stored = archive.load_run(&id).unwrap();
    assert_eq!(stored.config.radial.bins, 30);
    assert_eq!(stored.grid, grid);
    assert_eq!(summary(&stored.grid), summary(&grid));
    assert_eq!(radial_rows(&stored.grid, Channel::Primary).len(), 30);
}

#[test]
fn exports_from_archived_copy_match_live_grid() {
    let dir = tempfile::tempdir().unwrap();
    let config = ScoringConfig::default();
    let grid = merged_run(&config, 2);

    let archive = RunArchive::open_in_memory().unwrap();
    let record = archive.save_run("copy", &config, &grid, 2).unwrap();
    let stored = archive.load_run(&record.id).unwrap();

    let live = export_run(&dir.path().join("live"), "x", &grid, EnergyUnit::KeV).unwrap();
    let copy = export_run(&dir.path().join("copy"), "x", &stored.grid, EnergyUnit::KeV).unwrap();
    assert_eq!(live.len(), copy.len());
    for (a, b) in live.iter().zip(&copy) {
        assert_eq!(fs::read_to_string(a).unwrap(), fs::read_to_string(b).unwrap());
    }
}
