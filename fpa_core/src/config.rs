//! Runtime configuration types for the experiment engine.
//!
//! These are the structs the control loop consumes. They are separate from
//! the TOML-deserialized config in `fpa_config`; see `conversions`.

use serde::Serialize;

/// Which process variable is held constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variant {
    /// Constant mass-loss rate (g/m2s), nitrogen atmosphere.
    MassLossRate,
    /// Constant net heat flux into the sample (kW/m2), air atmosphere.
    NetHeatFlux,
}

impl Variant {
    pub fn unit(self) -> &'static str {
        match self {
            Variant::MassLossRate => "g/m2s",
            Variant::NetHeatFlux => "kW/m2",
        }
    }

    /// Short unit tag used in file names.
    pub fn file_unit(self) -> &'static str {
        match self {
            Variant::MassLossRate => "gm-2s-1",
            Variant::NetHeatFlux => "kWm-2",
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            Variant::MassLossRate => "N2",
            Variant::NetHeatFlux => "air",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Variant::MassLossRate => "mlr",
            Variant::NetHeatFlux => "nhf",
        }
    }

    /// Whether the process variable is non-negative by definition.
    pub fn non_negative(self) -> bool {
        matches!(self, Variant::MassLossRate)
    }

    pub fn default_pretest_s(self) -> f64 {
        match self {
            Variant::MassLossRate => 60.0,
            Variant::NetHeatFlux => 5.0,
        }
    }

    pub fn default_surface_area_m2(self) -> f64 {
        match self {
            Variant::MassLossRate => 0.1 * 0.1,
            Variant::NetHeatFlux => 0.09 * 0.09,
        }
    }

    /// Handover knobs the two experiment procedures were tuned with.
    pub fn default_handover(self) -> Handover {
        match self {
            Variant::MassLossRate => Handover {
                ratio: 0.95,
                min_ramp_s: 0.0,
            },
            Variant::NetHeatFlux => Handover {
                ratio: 0.95,
                min_ramp_s: 100.0,
            },
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// PID gains, all >= 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.2,
            ki: 0.04,
            kd: 0.2,
        }
    }
}

/// Lamp voltage limits. `min < max` is checked at build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorBounds {
    pub min: f64,
    pub max: f64,
}

impl ActuatorBounds {
    #[inline]
    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        (self.min..=self.max).contains(&v)
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

impl Default for ActuatorBounds {
    fn default() -> Self {
        Self { min: 0.25, max: 4.5 }
    }
}

/// When the ramp hands over to the PID.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handover {
    /// Fraction of the setpoint the smoothed value must reach.
    pub ratio: f64,
    /// Minimum ramp duration before convergence is checked (s).
    pub min_ramp_s: f64,
}

/// Open-loop ramp configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampCfg {
    /// Irradiation rate (kW/m2 per second).
    pub rate_kw_m2_s: f64,
    pub handover: Handover,
}

impl RampCfg {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            rate_kw_m2_s: 0.25,
            handover: variant.default_handover(),
        }
    }
}

/// Signal conditioning ahead of the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditioningCfg {
    /// Moving-average window (samples).
    pub window: usize,
    /// Dead-band half-width as a fraction of the setpoint.
    pub epsilon: f64,
    /// Floor negative raw values to zero before averaging.
    pub floor_negative: bool,
}

impl Default for ConditioningCfg {
    fn default() -> Self {
        Self {
            window: 30,
            epsilon: 0.2,
            floor_negative: false,
        }
    }
}

/// Polling loop timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCfg {
    /// Minimum interval between cycles (ms).
    pub period_ms: u64,
    /// Pre-test baseline duration (s); no actuation happens during it.
    pub pretest_s: f64,
    /// Coarse idle wait before the pre-test (ms).
    pub pre_delay_ms: u64,
    /// Snapshot the full history every N recorded cycles.
    pub snapshot_every: u32,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            period_ms: 100,
            pretest_s: 60.0,
            pre_delay_ms: 2000,
            snapshot_every: 1,
        }
    }
}

/// Sample geometry and thermal properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleCfg {
    pub surface_area_m2: f64,
    pub conductivity_w_mk: f64,
    pub tc_depths_m: [f64; 4],
    pub nhf_pretest_zero: bool,
}

impl SampleCfg {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            surface_area_m2: variant.default_surface_area_m2(),
            conductivity_w_mk: 0.19,
            tc_depths_m: [0.004, 0.008, 0.012, 0.016],
            nhf_pretest_zero: true,
        }
    }
}
