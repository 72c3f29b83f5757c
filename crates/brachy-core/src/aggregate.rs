//! Run-level ownership of per-worker grids and the single merge.
//!
//! Workers borrow their grid through [`RunAggregator::workers_mut`]; that
//! borrow has to end before [`RunAggregator::merge_all`] can take `&mut self`,
//! so no deposit can race with the merge.

use std::fmt;

use crate::config::GridLayout;
use crate::grid::AccumulatorGrid;
use crate::histogram::LayoutMismatch;

#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// `merge_all` was called a second time.
    AlreadyMerged,
    /// `merge_all` was called before any worker registered.
    NoWorkers,
    /// A worker was registered after the run had been merged.
    RunClosed,
    Layout(LayoutMismatch),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::AlreadyMerged => write!(f, "run already merged"),
            RunError::NoWorkers => write!(f, "merge requested with no registered workers"),
            RunError::RunClosed => write!(f, "cannot add a worker to a merged run"),
            RunError::Layout(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<LayoutMismatch> for RunError {
    fn from(e: LayoutMismatch) -> Self {
        RunError::Layout(e)
    }
}

pub struct RunAggregator {
    layout: GridLayout,
    grids: Vec<AccumulatorGrid>,
    merged: Option<AccumulatorGrid>,
    workers: usize,
}

impl RunAggregator {
    pub fn new(layout: GridLayout) -> Self {
        Self {
            layout,
            grids: Vec::new(),
            merged: None,
            workers: 0,
        }
    }

    /// Start a run with `workers` zeroed grids already registered.
    pub fn with_workers(layout: GridLayout, workers: usize) -> Self {
        Self {
            layout,
            grids: (0..workers).map(|_| AccumulatorGrid::new(layout)).collect(),
            merged: None,
            workers,
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Number of workers registered over the run's lifetime.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn is_merged(&self) -> bool {
        self.merged.is_some()
    }

    /// Register one more worker with a zeroed grid and return its index.
    pub fn new_worker(&mut self) -> Result<usize, RunError> {
        if self.is_merged() {
            return Err(RunError::RunClosed);
        }
        self.grids.push(AccumulatorGrid::new(self.layout));
        self.workers += 1;
        Ok(self.grids.len() - 1)
    }

    pub fn worker_mut(&mut self, idx: usize) -> Option<&mut AccumulatorGrid> {
        self.grids.get_mut(idx)
    }

    /// All worker grids, for handing one to each thread. Empty once merged.
    pub fn workers_mut(&mut self) -> &mut [AccumulatorGrid] {
        &mut self.grids
    }

    /// Sum every worker grid into the run result. Allowed exactly once.
    /// Worker grids are released after a successful merge.
    pub fn merge_all(&mut self) -> Result<&AccumulatorGrid, RunError> {
        if self.is_merged() {
            return Err(RunError::AlreadyMerged);
        }
        if self.grids.is_empty() {
            return Err(RunError::NoWorkers);
        }

        let mut merged = AccumulatorGrid::new(self.layout);
        for grid in &self.grids {
            merged.merge(grid)?;
        }
        self.grids = Vec::new();
        Ok(self.merged.insert(merged))
    }

    pub fn merged(&self) -> Option<&AccumulatorGrid> {
        self.merged.as_ref()
    }

    /// Take the merged grid out of a finished run.
    pub fn into_merged(self) -> Option<AccumulatorGrid> {
        self.merged
    }

    /// Discard the run without merging; partial grids are dropped, never
    /// partially merged.
    pub fn abort(self) {}
}
