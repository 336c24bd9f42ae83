//! Bridges from `fpa_config` (TOML schema) to the runtime config types.
//!
//! Variant-dependent defaults are resolved here, so the TOML may leave them out.

use crate::config::{
    ActuatorBounds, ConditioningCfg, Handover, LoopCfg, PidGains, RampCfg, SampleCfg, Variant,
};

// ── PidGains ─────────────────────────────────────────────────────────────────

impl From<&fpa_config::PidCfg> for PidGains {
    fn from(c: &fpa_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
        }
    }
}

// ── ActuatorBounds ───────────────────────────────────────────────────────────

impl From<&fpa_config::LampsCfg> for ActuatorBounds {
    fn from(c: &fpa_config::LampsCfg) -> Self {
        Self {
            min: c.min_voltage,
            max: c.max_voltage,
        }
    }
}

// ── Variant-resolved sections ────────────────────────────────────────────────

/// Runtime settings resolved for one variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub gains: PidGains,
    pub bounds: ActuatorBounds,
    pub ramp: RampCfg,
    pub conditioning: ConditioningCfg,
    pub timing: LoopCfg,
    pub sample: SampleCfg,
}

fn handover(variant: Variant, c: &fpa_config::HandoverCfg) -> Handover {
    let d = variant.default_handover();
    Handover {
        ratio: c.handover_ratio.unwrap_or(d.ratio),
        min_ramp_s: c.min_ramp_s.unwrap_or(d.min_ramp_s),
    }
}

/// Resolve every runtime section of `cfg` for `variant`.
pub fn resolve(cfg: &fpa_config::Config, variant: Variant) -> Resolved {
    let handover_cfg = match variant {
        Variant::MassLossRate => &cfg.ramp.mlr,
        Variant::NetHeatFlux => &cfg.ramp.nhf,
    };
    Resolved {
        gains: (&cfg.pid).into(),
        bounds: (&cfg.lamps).into(),
        ramp: RampCfg {
            rate_kw_m2_s: cfg.ramp.rate_kw_m2_s,
            handover: handover(variant, handover_cfg),
        },
        conditioning: ConditioningCfg {
            window: cfg.conditioning.window,
            epsilon: cfg.conditioning.epsilon,
            floor_negative: variant.non_negative(),
        },
        timing: LoopCfg {
            period_ms: cfg.loop_.period_ms,
            pretest_s: cfg
                .loop_
                .pretest_s
                .unwrap_or_else(|| variant.default_pretest_s()),
            pre_delay_ms: cfg.loop_.pre_delay_ms,
            snapshot_every: cfg.loop_.snapshot_every,
        },
        sample: SampleCfg {
            surface_area_m2: cfg
                .sample
                .surface_area_m2
                .unwrap_or_else(|| variant.default_surface_area_m2()),
            conductivity_w_mk: cfg.sample.conductivity_w_mk,
            tc_depths_m: cfg.sample.tc_depths_m,
            nhf_pretest_zero: cfg.sample.nhf_pretest_zero,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_defaults_fill_gaps() {
        let cfg = fpa_config::load_toml("[ramp.mlr]\nmin_ramp_s = 30.0").unwrap();
        let mlr = resolve(&cfg, Variant::MassLossRate);
        assert_eq!(mlr.ramp.handover.min_ramp_s, 30.0);
        assert_eq!(mlr.timing.pretest_s, 60.0);
        assert!(mlr.conditioning.floor_negative);

        let nhf = resolve(&cfg, Variant::NetHeatFlux);
        assert_eq!(nhf.ramp.handover.min_ramp_s, 100.0);
        assert_eq!(nhf.timing.pretest_s, 5.0);
        assert!(!nhf.conditioning.floor_negative);
        assert!((nhf.sample.surface_area_m2 - 0.0081).abs() < 1e-12);
    }
}
