#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration artifacts for the FPA feedback controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSVs are looked up by modification time ("latest wins") and
//!   parsed with strict headers.
use serde::Deserialize;

pub mod calibration;

pub use calibration::{
    GasCoefficients, LampCoefficients, latest_calibration_file, load_gas_calibration_csv,
    load_lamp_calibration_csv,
};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopCfg {
    /// Minimum interval between polling cycles (ms).
    pub period_ms: u64,
    /// Pre-test baseline duration in seconds. Absent = variant default.
    pub pretest_s: Option<f64>,
    /// Idle wait before the pre-test starts (ms).
    pub pre_delay_ms: u64,
    /// Write the full-history snapshot every N recorded cycles.
    pub snapshot_every: u32,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            period_ms: 100,
            pretest_s: None,
            pre_delay_ms: 2000,
            snapshot_every: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 0.2,
            ki: 0.04,
            kd: 0.2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LampsCfg {
    pub min_voltage: f64,
    pub max_voltage: f64,
}

impl Default for LampsCfg {
    fn default() -> Self {
        Self {
            min_voltage: 0.25,
            max_voltage: 4.5,
        }
    }
}

/// Per-variant handover knobs. Absent fields fall back to the variant default.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
pub struct HandoverCfg {
    /// Fraction of the setpoint the smoothed value must reach.
    pub handover_ratio: Option<f64>,
    /// Ramp must have run at least this long before convergence is checked.
    pub min_ramp_s: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RampCfg {
    /// Irradiation rate during the open-loop ramp (kW/m2 per second).
    pub rate_kw_m2_s: f64,
    pub mlr: HandoverCfg,
    pub nhf: HandoverCfg,
}

impl Default for RampCfg {
    fn default() -> Self {
        Self {
            rate_kw_m2_s: 0.25,
            mlr: HandoverCfg::default(),
            nhf: HandoverCfg::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConditioningCfg {
    /// Moving-average window in samples.
    pub window: usize,
    /// Dead-band as a fraction of the setpoint.
    pub epsilon: f64,
}

impl Default for ConditioningCfg {
    fn default() -> Self {
        Self {
            window: 30,
            epsilon: 0.2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SampleCfg {
    /// Exposed area used to normalise mass loss (m2). Absent = variant default.
    pub surface_area_m2: Option<f64>,
    /// Thermal conductivity of the sample (W/mK).
    pub conductivity_w_mk: f64,
    /// Thermocouple depths below the exposed surface (m), shallowest first.
    pub tc_depths_m: [f64; 4],
    /// Report NHF as zero during the pre-test.
    pub nhf_pretest_zero: bool,
}

impl Default for SampleCfg {
    fn default() -> Self {
        Self {
            surface_area_m2: None,
            conductivity_w_mk: 0.19,
            tc_depths_m: [0.004, 0.008, 0.012, 0.016],
            nhf_pretest_zero: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Directory holding lamp calibration CSVs.
    pub lamp_dir: String,
    /// Directory holding gas analyzer calibration CSVs; empty disables HRR channels.
    pub gas_dir: Option<String>,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            lamp_dir: "calibration_data".to_string(),
            gas_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputCfg {
    /// Parent directory under which each experiment folder is created.
    pub dir: String,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    /// Peak-to-peak amplitude of synthetic measurement noise (fraction of reading).
    pub noise: f64,
    /// Seed for the noise generator.
    pub seed: u64,
    /// Initial sample mass in grams.
    pub initial_mass_g: f64,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            noise: 0.0,
            seed: 0x5eed,
            initial_mass_g: 250.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "loop")]
    pub loop_: LoopCfg,
    pub pid: PidCfg,
    pub lamps: LampsCfg,
    pub ramp: RampCfg,
    pub conditioning: ConditioningCfg,
    pub sample: SampleCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
    pub output: OutputCfg,
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_handover(name: &str, h: &HandoverCfg) -> eyre::Result<()> {
    if let Some(r) = h.handover_ratio
        && !(r > 0.0 && r <= 1.0)
    {
        eyre::bail!("ramp.{name}.handover_ratio must be in (0.0, 1.0]");
    }
    if let Some(s) = h.min_ramp_s
        && !(s.is_finite() && s >= 0.0)
    {
        eyre::bail!("ramp.{name}.min_ramp_s must be >= 0");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Loop
        if self.loop_.period_ms == 0 {
            eyre::bail!("loop.period_ms must be >= 1");
        }
        if self.loop_.period_ms > 60_000 {
            eyre::bail!("loop.period_ms is unreasonably large (>60s)");
        }
        if let Some(p) = self.loop_.pretest_s
            && !(p.is_finite() && p >= 0.0)
        {
            eyre::bail!("loop.pretest_s must be >= 0");
        }
        if self.loop_.snapshot_every == 0 {
            eyre::bail!("loop.snapshot_every must be >= 1");
        }

        // PID
        for (k, v) in [
            ("kp", self.pid.kp),
            ("ki", self.pid.ki),
            ("kd", self.pid.kd),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                eyre::bail!("pid.{k} must be a finite value >= 0");
            }
        }

        // Lamps
        if !(self.lamps.min_voltage.is_finite() && self.lamps.max_voltage.is_finite()) {
            eyre::bail!("lamps voltages must be finite");
        }
        if self.lamps.min_voltage < 0.0 {
            eyre::bail!("lamps.min_voltage must be >= 0");
        }
        if self.lamps.min_voltage >= self.lamps.max_voltage {
            eyre::bail!("lamps.min_voltage must be < lamps.max_voltage");
        }

        // Ramp
        if !(self.ramp.rate_kw_m2_s.is_finite() && self.ramp.rate_kw_m2_s > 0.0) {
            eyre::bail!("ramp.rate_kw_m2_s must be > 0");
        }
        check_handover("mlr", &self.ramp.mlr)?;
        check_handover("nhf", &self.ramp.nhf)?;

        // Conditioning
        if self.conditioning.window == 0 {
            eyre::bail!("conditioning.window must be >= 1");
        }
        if !(0.0..1.0).contains(&self.conditioning.epsilon) {
            eyre::bail!("conditioning.epsilon must be in [0.0, 1.0)");
        }

        // Sample
        if let Some(a) = self.sample.surface_area_m2
            && !(a.is_finite() && a > 0.0)
        {
            eyre::bail!("sample.surface_area_m2 must be > 0");
        }
        if !(self.sample.conductivity_w_mk.is_finite() && self.sample.conductivity_w_mk > 0.0) {
            eyre::bail!("sample.conductivity_w_mk must be > 0");
        }
        if self.sample.tc_depths_m.windows(2).any(|w| w[1] <= w[0]) {
            eyre::bail!("sample.tc_depths_m must be strictly increasing");
        }

        // Calibration
        if self.calibration.lamp_dir.trim().is_empty() {
            eyre::bail!("calibration.lamp_dir must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Sim
        if !(0.0..=0.5).contains(&self.sim.noise) {
            eyre::bail!("sim.noise must be in [0.0, 0.5]");
        }
        if !(self.sim.initial_mass_g.is_finite() && self.sim.initial_mass_g > 0.0) {
            eyre::bail!("sim.initial_mass_g must be > 0");
        }

        Ok(())
    }
}
