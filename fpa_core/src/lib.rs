#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Lamp feedback control for the Fire Propagation Apparatus (hardware-agnostic).
//!
//! This crate drives the radiant lamps so a sample either absorbs a constant
//! net heat flux or pyrolyses at a constant mass-loss rate. All hardware
//! interactions go through the `fpa_traits` instrument traits.
//!
//! ## Architecture
//!
//! - **Calibration**: flux/voltage and gas-channel polynomials (`calibration`)
//! - **Sensors**: mass-loss-rate and net-heat-flux adapters (`sensor`)
//! - **Conditioning**: trailing moving average and dead-band (`conditioning`)
//! - **Control**: pure PID evaluation over explicit state (`pid`)
//! - **Phases**: open-loop ramp handing over to the PID (`phase`)
//! - **Loop**: fixed-period polling, persistence and shutdown (`experiment`)
//!
//! All fluxes are in kW/m2, mass-loss rates in g/m2s, times in seconds.

pub mod builder;
pub mod calibration;
pub mod conditioning;
pub mod config;
pub mod conversions;
pub mod error;
pub mod experiment;
pub mod hw_error;
pub mod mocks;
pub mod phase;
pub mod pid;
pub mod record;
pub mod sensor;
pub mod sink;
pub mod status;
pub mod util;

pub use builder::{ExperimentBuilder, Missing, Set};
pub use calibration::{
    CalibrationStore, DirCalibrationStore, GasCalibration, LampCalibration, Polynomial,
    StaticCalibration,
};
pub use conditioning::{Conditioned, Conditioner, dead_band, moving_average};
pub use config::{
    ActuatorBounds, ConditioningCfg, Handover, LoopCfg, PidGains, RampCfg, SampleCfg, Variant,
};
pub use conversions::{Resolved, resolve};
pub use error::{BuildError, FpaError};
pub use experiment::{Experiment, ExperimentCore};
pub use phase::{Command, Phase, PhaseMachine};
pub use pid::{ControllerState, PidTerms, evaluate};
pub use record::{Marker, SampleRecord, Stage};
pub use sensor::{
    Channel, MassLossRateSensor, NetHeatFluxSensor, ProcessSensor, Reading, WithGasChannels,
};
pub use sink::{MemorySink, NullSink, RecordSink, Tee};
pub use status::{CycleStatus, RunSummary};
