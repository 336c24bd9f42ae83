//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use fpa_core::Variant;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "fpa", version, about = "FPA lamp feedback controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/fpa_config.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Quantity held constant during the experiment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VariantArg {
    /// Mass-loss rate (g/m2s), nitrogen atmosphere
    Mlr,
    /// Net heat flux (kW/m2), air atmosphere
    Nhf,
}

impl From<VariantArg> for Variant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Mlr => Variant::MassLossRate,
            VariantArg::Nhf => Variant::NetHeatFlux,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a controlled-irradiation experiment on the simulated rig
    Run {
        #[arg(long, value_enum)]
        variant: VariantArg,
        /// Target value in the variant's unit
        #[arg(long)]
        setpoint: f64,
        /// Test number, used in the output folder name
        #[arg(long = "test-id", value_name = "NNN")]
        test_id: String,
        /// Sample material label, used in the output folder name
        #[arg(long)]
        material: String,
        /// Skip the confirmation prompt
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
        /// Stop automatically after this many seconds of logging
        #[arg(long, value_name = "SECS")]
        max_duration_s: Option<f64>,
        /// Parent directory for the experiment folder (overrides [output] dir)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Print the latest lamp (and gas) calibration coefficients
    Calibration,
    /// Quick health check (config, calibration lookup, simulated rig)
    SelfCheck,
}
