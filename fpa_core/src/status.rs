//! Outcome of a single polling cycle and of a whole run.

use serde::Serialize;

use crate::error::FpaError;
use crate::record::SampleRecord;

/// Public status of a single step of the polling loop.
#[derive(Debug)]
pub enum CycleStatus {
    /// A row was produced and handed to the sink.
    Recorded(Box<SampleRecord>),
    /// The cycle failed recoverably; no row was written.
    Skipped(FpaError),
}

impl CycleStatus {
    pub fn is_recorded(&self) -> bool {
        matches!(self, CycleStatus::Recorded(_))
    }
}

/// Totals reported when a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    /// Polling cycles attempted.
    pub cycles: u64,
    /// Data rows written (sentinel excluded).
    pub rows: u64,
    pub failed_cycles: u64,
    /// Experiment time at which the PID took over, if it did.
    pub handover_at_s: Option<f64>,
    pub duration_s: f64,
}

impl RunSummary {
    pub fn duration_min(&self) -> f64 {
        self.duration_s / 60.0
    }
}
