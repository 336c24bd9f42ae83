//! PID evaluation over explicit state.
//!
//! The controller is a pure function: the caller owns `ControllerState`,
//! passes the evaluation time in, and stores the returned state. The
//! integral is kept directly in volts and clamped to the lamp bounds, and
//! the derivative acts on the measurement rather than on the error.

use serde::Serialize;

use crate::config::{ActuatorBounds, PidGains};
use crate::error::FpaError;

/// Most recent P/I/D contributions, in volts. Logged only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PidTerms {
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
}

/// State carried across controller evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerState {
    /// Time of the last evaluation (s, on the experiment clock).
    pub previous_time: f64,
    pub last_error: f64,
    pub last_input: f64,
    /// Running integral in volts; always inside the actuator bounds.
    pub integral_accumulator: f64,
    pub proportional_term: f64,
    pub derivative_term: f64,
}

impl ControllerState {
    /// State at handover from the ramp.
    ///
    /// The integral starts at the last ramp command so the first PID output
    /// continues from where the ramp left off.
    pub fn seeded(
        now: f64,
        input: f64,
        setpoint: f64,
        last_command: f64,
        bounds: &ActuatorBounds,
    ) -> Self {
        Self {
            previous_time: now,
            last_error: setpoint - input,
            last_input: input,
            integral_accumulator: bounds.clamp(last_command),
            proportional_term: 0.0,
            derivative_term: 0.0,
        }
    }

    pub fn terms(&self) -> PidTerms {
        PidTerms {
            proportional: self.proportional_term,
            integral: self.integral_accumulator,
            derivative: self.derivative_term,
        }
    }
}

/// One controller evaluation at time `now`.
///
/// Returns the clamped lamp command and the state to carry forward. Fails
/// with `DegenerateTimestep` when `now` does not advance past
/// `state.previous_time`; the state is then left for the caller to keep.
pub fn evaluate(
    process_variable: f64,
    setpoint: f64,
    now: f64,
    state: &ControllerState,
    gains: &PidGains,
    bounds: &ActuatorBounds,
) -> Result<(f64, ControllerState), FpaError> {
    let dt = now - state.previous_time;
    if dt.is_nan() || dt <= 0.0 {
        return Err(FpaError::DegenerateTimestep { dt });
    }

    let error = setpoint - process_variable;
    let proportional = gains.kp * error;
    let integral = bounds.clamp(state.integral_accumulator + gains.ki * error * dt);
    let derivative = gains.kd * (process_variable - state.last_input) / dt;

    let raw = proportional + integral - derivative;
    let command = bounds.clamp(raw);

    tracing::trace!(
        error,
        dt,
        p = proportional,
        i = integral,
        d = derivative,
        raw,
        command,
        "pid evaluate"
    );

    Ok((
        command,
        ControllerState {
            previous_time: now,
            last_error: error,
            last_input: process_variable,
            integral_accumulator: integral,
            proportional_term: proportional,
            derivative_term: derivative,
        },
    ))
}
