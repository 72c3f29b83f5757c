//! Step stream → per-worker grids → merged run.
//!
//! Workers start before the first line is read. The reader routes each record
//! over a bounded channel to worker `event_id % workers`, so memory stays
//! proportional to the channel depth rather than to the input.

use std::io::BufRead;
use std::sync::mpsc::{self, SyncSender};
use std::thread;

use anyhow::{Context, Result, anyhow};
use brachy_core::{
    AccumulatorGrid, EventIngest, IngestStats, Projections, RunAggregator, ScoringConfig,
    TransportStepRecord,
};

/// Records buffered per worker before the reader blocks.
const CHANNEL_DEPTH: usize = 1024;

/// Merged grid of a streamed run plus its counters.
pub struct RunOutcome {
    pub grid: AccumulatorGrid,
    pub stats: IngestStats,
    /// Malformed input lines that were logged and dropped.
    pub skipped: u64,
}

/// Score a JSONL step stream on `workers` threads and merge the worker grids
/// once every thread has joined.
pub fn run_stream(
    config: &ScoringConfig,
    projections: Projections,
    reader: impl BufRead,
    workers: usize,
) -> Result<RunOutcome> {
    let selector = config
        .volume_selector()
        .context("invalid scoring volume pattern")?;
    let workers = workers.max(1);
    let mut run = RunAggregator::with_workers(config.layout(), workers);

    let (per_worker, skipped) = thread::scope(|s| -> Result<(Vec<IngestStats>, u64)> {
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for (worker, grid) in run.workers_mut().iter_mut().enumerate() {
            let (tx, rx) = mpsc::sync_channel::<TransportStepRecord>(CHANNEL_DEPTH);
            senders.push(tx);
            let selector = selector.clone();
            handles.push(s.spawn(move || {
                let mut ingest = EventIngest::new(grid, selector).with_projections(projections);
                for record in rx {
                    ingest.process(&record);
                }
                let stats = ingest.finish();
                tracing::debug!(
                    worker,
                    seen = stats.seen,
                    deposited = stats.deposited,
                    rejected = stats.rejected,
                    outside_volume = stats.outside_volume,
                    events = stats.events,
                    "worker finished"
                );
                stats
            }));
        }

        let fed = feed(reader, &senders);
        // closing the channels lets the workers drain and return
        drop(senders);

        let per_worker = handles
            .into_iter()
            .enumerate()
            .map(|(worker, h)| h.join().map_err(|_| anyhow!("worker {worker} panicked")))
            .collect::<Result<Vec<_>>>()?;
        Ok((per_worker, fed?))
    })?;

    let mut stats = IngestStats::default();
    for s in &per_worker {
        stats.merge(s);
    }

    run.merge_all().context("failed to merge worker grids")?;
    let grid = run.into_merged().context("run has no merged grid")?;
    tracing::info!(
        workers,
        deposited = stats.deposited,
        events = grid.events.events,
        skipped,
        "merged run"
    );
    Ok(RunOutcome {
        grid,
        stats,
        skipped,
    })
}

/// Route every parseable line to its worker. Returns the skipped line count.
fn feed(reader: impl BufRead, senders: &[SyncSender<TransportStepRecord>]) -> Result<u64> {
    let mut skipped = 0u64;
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", n + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<TransportStepRecord>(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "skipping malformed step record");
                skipped += 1;
                continue;
            }
        };
        let slot = (record.event_id % senders.len() as u64) as usize;
        senders[slot]
            .send(record)
            .map_err(|_| anyhow!("worker {slot} stopped before the input ended"))?;
    }
    Ok(skipped)
}
