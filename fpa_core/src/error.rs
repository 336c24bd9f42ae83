use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FpaError {
    /// Zero or negative elapsed time handed to the PID controller.
    #[error("degenerate timestep: dt = {dt} s")]
    DegenerateTimestep { dt: f64 },
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("sensor timeout")]
    Timeout,
    #[error("no calibration found: {0}")]
    NoCalibrationFound(String),
    #[error("invalid calibration: {0}")]
    Calibration(String),
    #[error("lamp command failed: {0}")]
    ActuatorWrite(String),
    #[error("persistence failed: {0}")]
    Sink(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl FpaError {
    /// Faults that only cost the current cycle its log row.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FpaError::SensorRead(_)
                | FpaError::Timeout
                | FpaError::DegenerateTimestep { .. }
                | FpaError::Sink(_)
        )
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing process sensor")]
    MissingSensor,
    #[error("missing lamp supply")]
    MissingLamps,
    #[error("missing record sink")]
    MissingSink,
    #[error("missing setpoint")]
    MissingSetpoint,
    #[error("missing lamp calibration")]
    MissingCalibration,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
