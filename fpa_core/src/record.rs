//! One row of experiment history.

use serde::Serialize;

use crate::phase::{Command, Phase};
use crate::pid::PidTerms;
use crate::sensor::{Channel, Reading};

/// Where in the run a row was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Baseline recording; lamps are off.
    Pretest,
    Ramping,
    Controlling,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pretest => "pretest",
            Stage::Ramping => "ramping",
            Stage::Controlling => "controlling",
        }
    }
}

impl From<Phase> for Stage {
    fn from(p: Phase) -> Self {
        match p {
            Phase::Ramping => Stage::Ramping,
            Phase::Controlling => Stage::Controlling,
        }
    }
}

/// Observation markers written into the log's `observation` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    StartLogging,
    StartTest,
    /// Terminal sentinel row written on shutdown.
    EndTest,
}

impl Marker {
    pub fn as_str(self) -> &'static str {
        match self {
            Marker::StartLogging => "start_logging",
            Marker::StartTest => "start_test",
            Marker::EndTest => "end_test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    /// Index of the polling cycle that produced this row (failed cycles still count).
    pub cycle: u64,
    /// Seconds since logging started.
    pub time_s: f64,
    pub marker: Option<Marker>,
    pub stage: Stage,
    pub pv_raw: f64,
    pub pv_smoothed: f64,
    pub pv_controller: f64,
    pub lamp_volts: f64,
    /// Incident heat flux implied by `lamp_volts` (kW/m2).
    pub ihf_kw_m2: f64,
    pub terms: Option<PidTerms>,
    pub channels: Vec<Channel>,
}

impl SampleRecord {
    /// Baseline row: no actuation.
    pub fn pretest(
        cycle: u64,
        time_s: f64,
        reading: Reading,
        smoothed: f64,
        controller_input: f64,
    ) -> Self {
        Self {
            cycle,
            time_s,
            marker: None,
            stage: Stage::Pretest,
            pv_raw: reading.process_variable,
            pv_smoothed: smoothed,
            pv_controller: controller_input,
            lamp_volts: 0.0,
            ihf_kw_m2: 0.0,
            terms: None,
            channels: reading.channels,
        }
    }

    pub fn controlled(
        cycle: u64,
        time_s: f64,
        reading: Reading,
        smoothed: f64,
        controller_input: f64,
        cmd: &Command,
    ) -> Self {
        Self {
            cycle,
            time_s,
            marker: None,
            stage: cmd.phase.into(),
            pv_raw: reading.process_variable,
            pv_smoothed: smoothed,
            pv_controller: controller_input,
            lamp_volts: cmd.volts,
            ihf_kw_m2: cmd.flux_kw_m2,
            terms: cmd.terms,
            channels: reading.channels,
        }
    }

    /// Sentinel closing the log. Values are zero; only time and marker matter.
    pub fn end_of_test(cycle: u64, time_s: f64, stage: Stage) -> Self {
        Self {
            cycle,
            time_s,
            marker: Some(Marker::EndTest),
            stage,
            pv_raw: 0.0,
            pv_smoothed: 0.0,
            pv_controller: 0.0,
            lamp_volts: 0.0,
            ihf_kw_m2: 0.0,
            terms: None,
            channels: Vec::new(),
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn is_sentinel(&self) -> bool {
        self.marker == Some(Marker::EndTest)
    }

    pub fn channel(&self, name: &str) -> Option<f64> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }
}
