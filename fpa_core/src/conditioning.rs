//! Smoothing and dead-band ahead of the controller.

use crate::config::ConditioningCfg;

/// Arithmetic mean of the trailing `window` samples ending at `index` (inclusive).
///
/// Near the start of the run the window shrinks to the samples available;
/// it never reads before `series[0]`. Returns `None` when `index` is out of
/// range or `window` is zero.
pub fn moving_average(series: &[f64], index: usize, window: usize) -> Option<f64> {
    if window == 0 || index >= series.len() {
        return None;
    }
    let n = window.min(index + 1);
    let start = index + 1 - n;
    let sum: f64 = series[start..=index].iter().sum();
    Some(sum / n as f64)
}

/// Snap `value` to `setpoint` when it is within `epsilon * setpoint`.
///
/// Only the controller input goes through this; logged values stay untouched.
#[inline]
pub fn dead_band(value: f64, setpoint: f64, epsilon: f64) -> f64 {
    let tolerance = (epsilon * setpoint).abs();
    if (value - setpoint).abs() < tolerance {
        setpoint
    } else {
        value
    }
}

/// Output of one conditioning pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditioned {
    /// Raw value after the non-negativity floor.
    pub raw: f64,
    /// Trailing moving average.
    pub smoothed: f64,
    /// What the controller sees (dead-banded smoothed value).
    pub controller_input: f64,
}

/// Keeps the raw series for the run and produces conditioned values.
#[derive(Debug, Clone)]
pub struct Conditioner {
    cfg: ConditioningCfg,
    series: Vec<f64>,
}

impl Conditioner {
    pub fn new(cfg: ConditioningCfg) -> Self {
        Self {
            cfg,
            series: Vec::new(),
        }
    }

    pub fn cfg(&self) -> &ConditioningCfg {
        &self.cfg
    }

    /// Number of samples accepted so far.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Append a raw sample and return its conditioned form.
    pub fn push(&mut self, raw: f64, setpoint: f64) -> Conditioned {
        let raw = if self.cfg.floor_negative {
            raw.max(0.0)
        } else {
            raw
        };
        self.series.push(raw);
        let idx = self.series.len() - 1;
        let smoothed = moving_average(&self.series, idx, self.cfg.window.max(1)).unwrap_or(raw);
        Conditioned {
            raw,
            smoothed,
            controller_input: dead_band(smoothed, setpoint, self.cfg.epsilon),
        }
    }

    pub fn reset(&mut self) {
        self.series.clear();
    }
}
