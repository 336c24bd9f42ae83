//! The polling/logging loop.
//!
//! One cycle: wait out the period, read the sensor, condition, let the
//! phase machine pick a lamp command, drive the lamps, persist the row.
//! Recoverable faults cost the cycle its row and nothing else; a lamp
//! write failure ends the run. Every exit path through `run` drives the
//! lamps to zero.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use fpa_traits::clock::Clock;
use fpa_traits::LampSupply;

use crate::conditioning::Conditioner;
use crate::config::LoopCfg;
use crate::error::{FpaError, Result};
use crate::hw_error::{HwSide, map_hw_error};
use crate::phase::{Phase, PhaseMachine};
use crate::record::{Marker, SampleRecord, Stage};
use crate::sensor::ProcessSensor;
use crate::sink::RecordSink;
use crate::status::{CycleStatus, RunSummary};

/// Callback invoked with every recorded row (progress line, live display).
pub type ProgressHook = Box<dyn FnMut(&SampleRecord)>;

/// Unified loop for both dynamic (boxed) and generic (static dispatch) parts.
pub struct ExperimentCore<S: ProcessSensor, L: LampSupply> {
    pub(crate) sensor: S,
    pub(crate) lamps: L,
    pub(crate) sink: Box<dyn RecordSink>,
    pub(crate) machine: PhaseMachine,
    pub(crate) conditioner: Conditioner,
    pub(crate) timing: LoopCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    // t = 0 of the log; reset by begin()
    pub(crate) epoch: Instant,
    pub(crate) stop_check: Option<Box<dyn Fn() -> bool>>,
    pub(crate) progress: Option<ProgressHook>,
    pub(crate) max_duration_s: Option<f64>,

    history: Vec<SampleRecord>,
    last_cycle_at: Option<Instant>,
    // Experiment time of the first post-baseline cycle; ramp time counts from here
    test_start_s: Option<f64>,
    cycles: u64,
    rows: u64,
    failed_cycles: u64,
    handover_at_s: Option<f64>,
    shut_down: bool,
}

/// Boxed experiment as produced by the builder.
pub type Experiment = ExperimentCore<Box<dyn ProcessSensor>, Box<dyn LampSupply>>;

impl<S: ProcessSensor, L: LampSupply> core::fmt::Debug for ExperimentCore<S, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExperimentCore")
            .field("setpoint", &self.machine.setpoint())
            .field("phase", &self.machine.phase())
            .field("cycles", &self.cycles)
            .field("rows", &self.rows)
            .finish()
    }
}

impl<S: ProcessSensor, L: LampSupply> ExperimentCore<S, L> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        sensor: S,
        lamps: L,
        sink: Box<dyn RecordSink>,
        machine: PhaseMachine,
        conditioner: Conditioner,
        timing: LoopCfg,
        clock: Arc<dyn Clock + Send + Sync>,
        stop_check: Option<Box<dyn Fn() -> bool>>,
        progress: Option<ProgressHook>,
        max_duration_s: Option<f64>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            sensor,
            lamps,
            sink,
            machine,
            conditioner,
            timing,
            clock,
            epoch,
            stop_check,
            progress,
            max_duration_s,
            history: Vec::new(),
            last_cycle_at: None,
            test_start_s: None,
            cycles: 0,
            rows: 0,
            failed_cycles: 0,
            handover_at_s: None,
            shut_down: false,
        }
    }

    pub fn setpoint(&self) -> f64 {
        self.machine.setpoint()
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Stage of the most recent cycle.
    pub fn stage(&self) -> Stage {
        if self.test_start_s.is_some() {
            self.machine.phase().into()
        } else {
            Stage::Pretest
        }
    }

    pub fn machine(&self) -> &PhaseMachine {
        &self.machine
    }

    /// Every row recorded so far, in time order.
    pub fn history(&self) -> &[SampleRecord] {
        &self.history
    }

    pub fn timing(&self) -> &LoopCfg {
        &self.timing
    }

    /// Seconds since `begin()`.
    pub fn elapsed_s(&self) -> f64 {
        self.clock.secs_since(self.epoch)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            cycles: self.cycles,
            rows: self.rows,
            failed_cycles: self.failed_cycles,
            handover_at_s: self.handover_at_s,
            duration_s: self.elapsed_s(),
        }
    }

    /// Reset per-run state and start the log clock.
    ///
    /// Sleeps for the configured pre-delay first; this is the only blocking
    /// wait in a run.
    pub fn begin(&mut self) {
        if self.timing.pre_delay_ms > 0 {
            tracing::debug!(pre_delay_ms = self.timing.pre_delay_ms, "idle before logging");
            self.clock
                .sleep(Duration::from_millis(self.timing.pre_delay_ms));
        }
        self.epoch = self.clock.now();
        self.machine.reset();
        self.conditioner.reset();
        self.history.clear();
        self.last_cycle_at = None;
        self.test_start_s = None;
        self.cycles = 0;
        self.rows = 0;
        self.failed_cycles = 0;
        self.handover_at_s = None;
        self.shut_down = false;
        tracing::info!(
            setpoint = self.machine.setpoint(),
            period_ms = self.timing.period_ms,
            pretest_s = self.timing.pretest_s,
            baseline_cycles =
                crate::util::pretest_cycles(self.timing.pretest_s, self.timing.period_ms),
            "logging started"
        );
    }

    /// One iteration of the polling loop.
    ///
    /// Busy-waits until a full period has passed since the previous cycle
    /// started, then runs the cycle. Only an actuator fault is returned as
    /// `Err`; recoverable faults come back as `CycleStatus::Skipped`.
    pub fn step(&mut self) -> Result<CycleStatus> {
        if let Some(prev) = self.last_cycle_at {
            self.clock
                .wait_until(prev + crate::util::period(self.timing.period_ms));
        }
        let started = self.clock.now();
        self.last_cycle_at = Some(started);
        let t = started.saturating_duration_since(self.epoch).as_secs_f64();
        let cycle = self.cycles;
        self.cycles += 1;

        match self.cycle(cycle, t) {
            Ok(record) => {
                self.persist(&record);
                Ok(CycleStatus::Recorded(Box::new(record)))
            }
            Err(e) if e.is_recoverable() => {
                self.failed_cycles += 1;
                tracing::warn!(cycle, t, error = %e, "cycle skipped");
                Ok(CycleStatus::Skipped(e))
            }
            Err(e) => {
                tracing::error!(cycle, t, error = %e, "fatal fault in polling cycle");
                Err(eyre::Report::new(e)).wrap_err_with(|| format!("cycle {cycle} at t = {t:.1} s"))
            }
        }
    }

    fn cycle(&mut self, cycle: u64, t: f64) -> std::result::Result<SampleRecord, FpaError> {
        let pretest = self.test_start_s.is_none() && t < self.timing.pretest_s;
        let reading = self.sensor.sample(t, pretest)?;
        let setpoint = self.machine.setpoint();
        let c = self.conditioner.push(reading.process_variable, setpoint);

        if pretest {
            let record =
                SampleRecord::pretest(cycle, t, reading, c.smoothed, c.controller_input);
            return Ok(if self.rows == 0 {
                record.with_marker(Marker::StartLogging)
            } else {
                record
            });
        }

        let first = self.test_start_s.is_none();
        let start = *self.test_start_s.get_or_insert(t);
        if first {
            tracing::info!(t, "baseline complete; lamps on");
        }
        let cmd = self
            .machine
            .step(t - start, c.smoothed, c.controller_input);
        self.lamps
            .set_voltage(cmd.volts)
            .map_err(|e| map_hw_error(&*e, HwSide::Actuator))?;
        if cmd.handover {
            self.handover_at_s = Some(t);
        }
        tracing::debug!(
            cycle,
            t,
            phase = %cmd.phase,
            raw = c.raw,
            smoothed = c.smoothed,
            volts = cmd.volts,
            ihf = cmd.flux_kw_m2,
            "cycle"
        );

        let record =
            SampleRecord::controlled(cycle, t, reading, c.smoothed, c.controller_input, &cmd);
        Ok(if first {
            record.with_marker(Marker::StartTest)
        } else {
            record
        })
    }

    fn persist(&mut self, record: &SampleRecord) {
        if let Err(e) = self.sink.append(record) {
            tracing::warn!(cycle = record.cycle, error = %e, "append to log failed");
        }
        self.history.push(record.clone());
        self.rows += 1;

        let every = u64::from(self.timing.snapshot_every);
        if every > 0
            && self.rows.is_multiple_of(every)
            && let Err(e) = self.sink.snapshot(&self.history)
        {
            tracing::warn!(rows = self.rows, error = %e, "history snapshot failed");
        }
        if let Some(progress) = self.progress.as_mut() {
            progress(record);
        }
    }

    /// Non-blocking check of the operator stop and the duration cap.
    pub fn stop_requested(&self) -> bool {
        if let Some(check) = &self.stop_check
            && check()
        {
            tracing::info!("operator requested stop");
            return true;
        }
        if let Some(max) = self.max_duration_s
            && self.elapsed_s() >= max
        {
            tracing::info!(max_duration_s = max, "duration limit reached");
            return true;
        }
        false
    }

    /// Run until stopped, then shut down.
    ///
    /// The stop check runs after every cycle, failed ones included, so the
    /// cycle in flight always finishes first.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.begin();
        let outcome = self.poll_until_stopped();
        let shutdown = self.shutdown();
        outcome?;
        shutdown?;
        let summary = self.summary();
        tracing::info!(
            cycles = summary.cycles,
            rows = summary.rows,
            failed = summary.failed_cycles,
            duration_s = summary.duration_s,
            "experiment finished"
        );
        Ok(summary)
    }

    fn poll_until_stopped(&mut self) -> Result<()> {
        loop {
            self.step()?;
            if self.stop_requested() {
                return Ok(());
            }
        }
    }

    /// Write the sentinel row, close the sink and drive the lamps to zero.
    ///
    /// Sink failures are logged; lamp failures are returned after both the
    /// zero command and the release have been attempted. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let sentinel = SampleRecord::end_of_test(self.cycles, self.elapsed_s(), self.stage());
        if let Err(e) = self.sink.append(&sentinel) {
            tracing::warn!(error = %e, "writing end-of-test row failed");
        }
        self.history.push(sentinel);
        if let Err(e) = self.sink.snapshot(&self.history) {
            tracing::warn!(error = %e, "final snapshot failed");
        }
        if let Err(e) = self.sink.finish() {
            tracing::warn!(error = %e, "closing log failed");
        }

        let zero = self
            .lamps
            .set_voltage(0.0)
            .map_err(|e| map_hw_error(&*e, HwSide::Actuator));
        if let Err(e) = &zero {
            tracing::error!(error = %e, "failed to drive lamps to zero");
        }
        let release = self
            .lamps
            .shutdown()
            .map_err(|e| map_hw_error(&*e, HwSide::Actuator));
        if let Err(e) = &release {
            tracing::warn!(error = %e, "lamp supply release failed");
        }
        zero.and(release)
            .map_err(eyre::Report::new)
            .wrap_err("lamp shutdown")
    }
}
