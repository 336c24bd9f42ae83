//! Ramp-then-PID state machine.
//!
//! The lamps start on an open-loop linear flux ramp. Once the smoothed
//! process variable reaches the handover ratio of the setpoint (and the ramp
//! has run for its minimum duration) control passes to the PID for the rest
//! of the run. There is no way back to the ramp.

use serde::Serialize;

use crate::calibration::LampCalibration;
use crate::config::{ActuatorBounds, PidGains, RampCfg};
use crate::pid::{self, ControllerState, PidTerms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ramping,
    Controlling,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Ramping => "ramping",
            Phase::Controlling => "controlling",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lamp command decided for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Command {
    pub volts: f64,
    /// Incident flux consistent with `volts` (kW/m2).
    pub flux_kw_m2: f64,
    /// Phase that produced this command.
    pub phase: Phase,
    /// PID contributions, present once controlling.
    pub terms: Option<PidTerms>,
    /// This cycle switched the machine from ramping to controlling.
    pub handover: bool,
}

/// Phase state plus the controller state it owns once controlling.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    setpoint: f64,
    ramp: RampCfg,
    gains: PidGains,
    bounds: ActuatorBounds,
    calibration: LampCalibration,
    // Some once the handover happened; never cleared.
    controller: Option<ControllerState>,
    last_command: Option<Command>,
}

impl PhaseMachine {
    pub fn new(
        setpoint: f64,
        ramp: RampCfg,
        gains: PidGains,
        bounds: ActuatorBounds,
        calibration: LampCalibration,
    ) -> Self {
        Self {
            setpoint,
            ramp,
            gains,
            bounds,
            calibration,
            controller: None,
            last_command: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.controller.is_some() {
            Phase::Controlling
        } else {
            Phase::Ramping
        }
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn controller(&self) -> Option<&ControllerState> {
        self.controller.as_ref()
    }

    pub fn last_command(&self) -> Option<&Command> {
        self.last_command.as_ref()
    }

    pub fn calibration(&self) -> &LampCalibration {
        &self.calibration
    }

    /// Back to the start of the ramp, for a fresh run.
    pub fn reset(&mut self) {
        self.controller = None;
        self.last_command = None;
    }

    /// Open-loop ramp command `ramp_s` seconds after the ramp started.
    ///
    /// The voltage is clamped to the lamp bounds; when clamping bites, the
    /// flux is recomputed from the clamped voltage so both stay consistent.
    pub fn ramp_command(&self, ramp_s: f64) -> (f64, f64) {
        let flux = ramp_s.max(0.0) * self.ramp.rate_kw_m2_s;
        let volts = self.calibration.volts_for_flux(flux);
        let clamped = self.bounds.clamp(volts);
        if clamped == volts {
            (clamped, flux)
        } else {
            (clamped, self.calibration.flux_for_volts(clamped))
        }
    }

    fn handover_due(&self, ramp_s: f64, smoothed: f64) -> bool {
        ramp_s >= self.ramp.handover.min_ramp_s
            && smoothed >= self.ramp.handover.ratio * self.setpoint
    }

    /// Advance one cycle.
    ///
    /// - `ramp_s`: seconds since the ramp started (test start)
    /// - `smoothed`: smoothed process variable, used for the handover test
    /// - `controller_input`: dead-banded value fed to the PID
    pub fn step(&mut self, ramp_s: f64, smoothed: f64, controller_input: f64) -> Command {
        let cmd = match self.controller {
            None => self.step_ramping(ramp_s, smoothed, controller_input),
            Some(state) => self.step_controlling(state, ramp_s, controller_input),
        };
        self.last_command = Some(cmd);
        cmd
    }

    fn step_ramping(&mut self, ramp_s: f64, smoothed: f64, controller_input: f64) -> Command {
        let (volts, flux_kw_m2) = self.ramp_command(ramp_s);
        if !self.handover_due(ramp_s, smoothed) {
            return Command {
                volts,
                flux_kw_m2,
                phase: Phase::Ramping,
                terms: None,
                handover: false,
            };
        }

        let state = ControllerState::seeded(
            ramp_s,
            controller_input,
            self.setpoint,
            volts,
            &self.bounds,
        );
        tracing::info!(
            t = ramp_s,
            smoothed,
            volts,
            setpoint = self.setpoint,
            "handover: PID active"
        );
        self.controller = Some(state);
        Command {
            volts,
            flux_kw_m2,
            phase: Phase::Ramping,
            terms: Some(state.terms()),
            handover: true,
        }
    }

    fn step_controlling(
        &mut self,
        state: ControllerState,
        now: f64,
        controller_input: f64,
    ) -> Command {
        match pid::evaluate(
            controller_input,
            self.setpoint,
            now,
            &state,
            &self.gains,
            &self.bounds,
        ) {
            Ok((volts, next)) => {
                self.controller = Some(next);
                Command {
                    volts,
                    flux_kw_m2: self.calibration.flux_for_volts(volts),
                    phase: Phase::Controlling,
                    terms: Some(next.terms()),
                    handover: false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping PID evaluation; holding previous command");
                let volts = self
                    .last_command
                    .map(|c| c.volts)
                    .unwrap_or(state.integral_accumulator);
                Command {
                    volts,
                    flux_kw_m2: self.calibration.flux_for_volts(volts),
                    phase: Phase::Controlling,
                    terms: Some(state.terms()),
                    handover: false,
                }
            }
        }
    }
}
