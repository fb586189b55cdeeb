//! In-memory result store: run index → repetition readings.
//!
//! The controller is the single mutating owner for the duration of a run;
//! the statistics engine receives a shared reference and only reads. A
//! `None` slot is a repetition that was attempted and failed after
//! retries — it counts as recorded for resume purposes but contributes no
//! sample to analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One parsed target response: metric name → finite value.
pub type MetricReading = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultStore {
    repetitions: usize,
    runs: BTreeMap<usize, Vec<Option<MetricReading>>>,
}

impl ResultStore {
    pub fn new(repetitions: usize) -> Self {
        Self {
            repetitions,
            runs: BTreeMap::new(),
        }
    }

    /// Configured repetition count per run.
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Append one repetition's reading (or a missing marker) to a run.
    pub fn record(&mut self, run: usize, reading: Option<MetricReading>) {
        let slots = self.runs.entry(run).or_default();
        debug_assert!(slots.len() < self.repetitions, "run {run} already complete");
        slots.push(reading);
    }

    /// Number of repetitions recorded for a run, including failed ones.
    pub fn recorded(&self, run: usize) -> usize {
        self.runs.get(&run).map_or(0, Vec::len)
    }

    pub fn is_complete(&self, run: usize) -> bool {
        self.recorded(run) >= self.repetitions
    }

    /// 1-based index of the next repetition to execute for a run.
    pub fn next_repetition(&self, run: usize) -> usize {
        self.recorded(run) + 1
    }

    /// Readings of a run, one slot per recorded repetition.
    pub fn readings(&self, run: usize) -> &[Option<MetricReading>] {
        self.runs.get(&run).map_or(&[], Vec::as_slice)
    }

    /// Finite samples of one metric across a run's repetitions.
    pub fn finite_values(&self, run: usize, metric: &str) -> Vec<f64> {
        self.readings(run)
            .iter()
            .flatten()
            .filter_map(|reading| reading.get(metric).copied())
            .filter(|v| v.is_finite())
            .collect()
    }

    /// Runs with at least one recorded repetition, ascending.
    pub fn run_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.runs.keys().copied()
    }
}
