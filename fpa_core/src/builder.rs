//! Type-state builder for `Experiment`.
//!
//! The builder enforces at compile time that the sensor, the lamps and the
//! setpoint are provided before `build()` is available. `try_build()` is
//! always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use fpa_traits::LampSupply;
use fpa_traits::clock::{Clock, MonotonicClock};

use crate::calibration::{CalibrationStore, LampCalibration};
use crate::conditioning::Conditioner;
use crate::config::*;
use crate::conversions::Resolved;
use crate::error::{BuildError, Result};
use crate::experiment::{Experiment, ExperimentCore, ProgressHook};
use crate::phase::PhaseMachine;
use crate::record::SampleRecord;
use crate::sensor::ProcessSensor;
use crate::sink::RecordSink;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Experiment`. All fields are validated on `build()`.
pub struct ExperimentBuilder<S, L, P> {
    sensor: Option<Box<dyn ProcessSensor>>,
    lamps: Option<Box<dyn LampSupply>>,
    setpoint: Option<f64>,
    sink: Option<Box<dyn RecordSink>>,
    calibration: Option<LampCalibration>,
    gains: Option<PidGains>,
    bounds: Option<ActuatorBounds>,
    ramp: Option<RampCfg>,
    conditioning: Option<ConditioningCfg>,
    timing: Option<LoopCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    stop_check: Option<Box<dyn Fn() -> bool>>,
    progress: Option<ProgressHook>,
    max_duration_s: Option<f64>,
    _s: PhantomData<S>,
    _l: PhantomData<L>,
    _p: PhantomData<P>,
}

impl Default for ExperimentBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            lamps: None,
            setpoint: None,
            sink: None,
            calibration: None,
            gains: None,
            bounds: None,
            ramp: None,
            conditioning: None,
            timing: None,
            clock: None,
            stop_check: None,
            progress: None,
            max_duration_s: None,
            _s: PhantomData,
            _l: PhantomData,
            _p: PhantomData,
        }
    }
}

impl Experiment {
    /// Start building an Experiment.
    pub fn builder() -> ExperimentBuilder<Missing, Missing, Missing> {
        ExperimentBuilder::default()
    }
}

impl<S, L, P> ExperimentBuilder<S, L, P> {
    // Moves every field across a type-state change.
    fn retype<S2, L2, P2>(self) -> ExperimentBuilder<S2, L2, P2> {
        ExperimentBuilder {
            sensor: self.sensor,
            lamps: self.lamps,
            setpoint: self.setpoint,
            sink: self.sink,
            calibration: self.calibration,
            gains: self.gains,
            bounds: self.bounds,
            ramp: self.ramp,
            conditioning: self.conditioning,
            timing: self.timing,
            clock: self.clock,
            stop_check: self.stop_check,
            progress: self.progress,
            max_duration_s: self.max_duration_s,
            _s: PhantomData,
            _l: PhantomData,
            _p: PhantomData,
        }
    }

    /// Fallible build available in any type-state; returns a detailed
    /// `BuildError` for missing or invalid pieces.
    pub fn try_build(self) -> Result<Experiment> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let lamps = self
            .lamps
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLamps))?;
        let setpoint = self
            .setpoint
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSetpoint))?;
        let sink = self
            .sink
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSink))?;
        let calibration = self
            .calibration
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCalibration))?;

        let gains = self.gains.unwrap_or_default();
        let bounds = self.bounds.unwrap_or_default();
        let ramp = self
            .ramp
            .unwrap_or_else(|| RampCfg::for_variant(Variant::MassLossRate));
        let conditioning = self.conditioning.unwrap_or_default();
        let timing = self.timing.unwrap_or_default();

        validate(setpoint, &gains, &bounds, &ramp, &conditioning, &timing)?;
        if let Some(max) = self.max_duration_s
            && !(max.is_finite() && max > 0.0)
        {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max duration must be a finite value > 0",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        Ok(ExperimentCore::from_parts(
            sensor,
            lamps,
            sink,
            PhaseMachine::new(setpoint, ramp, gains, bounds, calibration),
            Conditioner::new(conditioning),
            timing,
            clock,
            self.stop_check,
            self.progress,
            self.max_duration_s,
        ))
    }
}

fn validate(
    setpoint: f64,
    gains: &PidGains,
    bounds: &ActuatorBounds,
    ramp: &RampCfg,
    conditioning: &ConditioningCfg,
    timing: &LoopCfg,
) -> Result<()> {
    let invalid = |msg: &'static str| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));

    if !(setpoint.is_finite() && setpoint > 0.0) {
        return invalid("setpoint must be a finite value > 0");
    }
    if [gains.kp, gains.ki, gains.kd]
        .iter()
        .any(|g| !g.is_finite() || *g < 0.0)
    {
        return invalid("PID gains must be finite and >= 0");
    }
    if !bounds.is_valid() {
        return invalid("lamp voltage bounds must be finite with min < max");
    }
    if !(ramp.rate_kw_m2_s.is_finite() && ramp.rate_kw_m2_s > 0.0) {
        return invalid("ramp rate must be > 0");
    }
    if !(ramp.handover.ratio > 0.0 && ramp.handover.ratio <= 1.0) {
        return invalid("handover ratio must be in (0, 1]");
    }
    if !(ramp.handover.min_ramp_s.is_finite() && ramp.handover.min_ramp_s >= 0.0) {
        return invalid("minimum ramp duration must be >= 0");
    }
    if conditioning.window == 0 {
        return invalid("smoothing window must be >= 1");
    }
    if !(0.0..1.0).contains(&conditioning.epsilon) {
        return invalid("dead-band epsilon must be in [0, 1)");
    }
    if timing.period_ms == 0 {
        return invalid("period_ms must be >= 1");
    }
    if !(timing.pretest_s.is_finite() && timing.pretest_s >= 0.0) {
        return invalid("pretest duration must be >= 0");
    }
    Ok(())
}

/// Chainable setters that do not affect type-state
impl<S, L, P> ExperimentBuilder<S, L, P> {
    pub fn with_sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }
    pub fn with_calibration(mut self, calibration: LampCalibration) -> Self {
        self.calibration = Some(calibration);
        self
    }
    /// Load the latest lamp calibration from a store.
    pub fn with_calibration_from(mut self, store: &dyn CalibrationStore) -> Result<Self> {
        self.calibration = Some(store.load_latest()?);
        Ok(self)
    }
    pub fn with_gains(mut self, gains: PidGains) -> Self {
        self.gains = Some(gains);
        self
    }
    pub fn with_bounds(mut self, bounds: ActuatorBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
    pub fn with_ramp(mut self, ramp: RampCfg) -> Self {
        self.ramp = Some(ramp);
        self
    }
    pub fn with_conditioning(mut self, conditioning: ConditioningCfg) -> Self {
        self.conditioning = Some(conditioning);
        self
    }
    pub fn with_timing(mut self, timing: LoopCfg) -> Self {
        self.timing = Some(timing);
        self
    }
    /// Apply every runtime section resolved from a config file.
    pub fn with_resolved(self, r: &Resolved) -> Self {
        self.with_gains(r.gains)
            .with_bounds(r.bounds)
            .with_ramp(r.ramp)
            .with_conditioning(r.conditioning)
            .with_timing(r.timing)
    }
    /// Operator stop, polled once after every cycle.
    pub fn with_stop_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.stop_check = Some(Box::new(f));
        self
    }
    pub fn with_progress<F>(mut self, f: F) -> Self
    where
        F: FnMut(&SampleRecord) + 'static,
    {
        self.progress = Some(Box::new(f));
        self
    }
    /// Stop automatically this many seconds after logging starts.
    pub fn with_max_duration_s(mut self, secs: f64) -> Self {
        self.max_duration_s = Some(secs);
        self
    }
    /// Provide a custom clock implementation; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<L, P> ExperimentBuilder<Missing, L, P> {
    pub fn with_sensor(
        mut self,
        sensor: impl ProcessSensor + 'static,
    ) -> ExperimentBuilder<Set, L, P> {
        self.sensor = Some(Box::new(sensor));
        self.retype()
    }
}

impl<S, P> ExperimentBuilder<S, Missing, P> {
    pub fn with_lamps(mut self, lamps: impl LampSupply + 'static) -> ExperimentBuilder<S, Set, P> {
        self.lamps = Some(Box::new(lamps));
        self.retype()
    }
}

impl<S, L> ExperimentBuilder<S, L, Missing> {
    pub fn with_setpoint(mut self, setpoint: f64) -> ExperimentBuilder<S, L, Set> {
        self.setpoint = Some(setpoint);
        self.retype()
    }
}

impl ExperimentBuilder<Set, Set, Set> {
    /// Validate and build. Only available when sensor, lamps and setpoint are set.
    pub fn build(self) -> Result<Experiment> {
        self.try_build()
    }
}
