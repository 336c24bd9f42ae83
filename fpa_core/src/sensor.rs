//! Process-variable adapters over the raw instruments.
//!
//! Each adapter turns one instrument query into a single process variable
//! plus any extra channels worth logging. Hardware errors are mapped into
//! `FpaError` here so the loop only sees the typed taxonomy.

use nalgebra::{Matrix4x3, Vector4};
use serde::Serialize;

use fpa_traits::{GasAnalyzer, LoadCell, SampleThermocouples};

use crate::calibration::GasCalibration;
use crate::error::FpaError;
use crate::hw_error::{HwSide, map_hw_error};

/// Offset used by the rig to convert thermocouple readings to kelvin.
pub const CELSIUS_TO_KELVIN: f64 = 273.0;

/// A named value logged alongside the process variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Channel {
    pub name: &'static str,
    pub value: f64,
}

/// Result of one sensor query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reading {
    pub process_variable: f64,
    pub channels: Vec<Channel>,
}

/// Source of the controlled process variable.
pub trait ProcessSensor {
    /// Names of the extra channels, in the order `sample` reports them.
    fn channel_names(&self) -> Vec<&'static str>;

    /// Query the instruments at experiment time `t_s`.
    ///
    /// `pretest` is true while the baseline is being recorded.
    fn sample(&mut self, t_s: f64, pretest: bool) -> Result<Reading, FpaError>;
}

impl<T: ProcessSensor + ?Sized> ProcessSensor for Box<T> {
    fn channel_names(&self) -> Vec<&'static str> {
        (**self).channel_names()
    }
    fn sample(&mut self, t_s: f64, pretest: bool) -> Result<Reading, FpaError> {
        (**self).sample(t_s, pretest)
    }
}

#[inline]
fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ── Mass-loss rate ───────────────────────────────────────────────────────────

/// Mass-loss rate per unit area (g/m2s) from successive load-cell readings.
#[derive(Debug)]
pub struct MassLossRateSensor<L: LoadCell> {
    cell: L,
    area_m2: f64,
    last: Option<(f64, f64)>,
}

impl<L: LoadCell> MassLossRateSensor<L> {
    pub fn new(cell: L, area_m2: f64) -> Self {
        Self {
            cell,
            area_m2,
            last: None,
        }
    }

    /// Forget the previous reading; the next sample reports a zero rate.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl<L: LoadCell> ProcessSensor for MassLossRateSensor<L> {
    fn channel_names(&self) -> Vec<&'static str> {
        vec!["mass_g"]
    }

    fn sample(&mut self, t_s: f64, _pretest: bool) -> Result<Reading, FpaError> {
        let mass = self
            .cell
            .read_mass()
            .map_err(|e| map_hw_error(&*e, HwSide::Sensor))?;
        let rate = match self.last {
            None => 0.0,
            Some((t0, m0)) => {
                let dt = t_s - t0;
                if dt.is_nan() || dt <= 0.0 {
                    return Err(FpaError::SensorRead(format!(
                        "load cell sampled twice without time advancing (dt = {dt} s)"
                    )));
                }
                round1(-(mass - m0) / dt / self.area_m2)
            }
        };
        self.last = Some((t_s, mass));
        Ok(Reading {
            process_variable: rate,
            channels: vec![Channel {
                name: "mass_g",
                value: mass,
            }],
        })
    }
}

// ── Net heat flux ────────────────────────────────────────────────────────────

/// Relative singular-value cutoff below which the depth set counts as
/// rank deficient.
const FIT_RANK_TOL: f64 = 1e-12;

/// Least-squares quadratic through four points.
///
/// Returns `[c2, c1, c0]` for `y = c2*x^2 + c1*x + c0`, or `None` when the
/// abscissae do not determine a quadratic. The fit runs on centred `x` and
/// is shifted back, which keeps the design matrix well conditioned for
/// millimetre-scale depths.
pub fn fit_quadratic(xs: &[f64; 4], ys: &[f64; 4]) -> Option<[f64; 3]> {
    let mean = xs.iter().sum::<f64>() / 4.0;
    // Columns are 1, u, u^2 for y = a0 + a1*u + a2*u^2.
    let design = Matrix4x3::from_fn(|row, col| (xs[row] - mean).powi(col as i32));
    let svd = design.svd(true, true);
    let tol = svd.singular_values.max() * FIT_RANK_TOL;
    if !tol.is_finite() || svd.rank(tol) < 3 {
        return None;
    }
    let a = svd.solve(&Vector4::from_column_slice(ys), tol).ok()?;

    let (a0, a1, a2) = (a[0], a[1], a[2]);
    let c2 = a2;
    let c1 = a1 - 2.0 * a2 * mean;
    let c0 = a2 * mean * mean - a1 * mean + a0;
    [c2, c1, c0].iter().all(|c| c.is_finite()).then_some([c2, c1, c0])
}

/// Net heat flux into the sample surface (kW/m2) from the in-depth profile.
#[derive(Debug)]
pub struct NetHeatFluxSensor<T: SampleThermocouples> {
    tcs: T,
    depths_m: [f64; 4],
    conductivity_w_mk: f64,
    zero_during_pretest: bool,
}

impl<T: SampleThermocouples> NetHeatFluxSensor<T> {
    pub fn new(tcs: T, depths_m: [f64; 4], conductivity_w_mk: f64) -> Self {
        Self {
            tcs,
            depths_m,
            conductivity_w_mk,
            zero_during_pretest: true,
        }
    }

    /// Report the derived flux as zero while the baseline is recorded.
    pub fn zero_during_pretest(mut self, on: bool) -> Self {
        self.zero_during_pretest = on;
        self
    }
}

impl<T: SampleThermocouples> ProcessSensor for NetHeatFluxSensor<T> {
    fn channel_names(&self) -> Vec<&'static str> {
        vec!["T4_K", "T8_K", "T12_K", "T16_K", "surface_temp_K"]
    }

    fn sample(&mut self, _t_s: f64, pretest: bool) -> Result<Reading, FpaError> {
        let celsius = self
            .tcs
            .read_profile()
            .map_err(|e| map_hw_error(&*e, HwSide::Sensor))?;
        let kelvin = celsius.map(|c| c + CELSIUS_TO_KELVIN);
        if kelvin.iter().any(|k| !k.is_finite()) {
            return Err(FpaError::SensorRead(
                "thermocouple returned a non-finite temperature".into(),
            ));
        }
        let [_, c1, c0] = fit_quadratic(&self.depths_m, &kelvin).ok_or_else(|| {
            FpaError::SensorRead("temperature profile fit is singular".into())
        })?;

        let nhf = if pretest && self.zero_during_pretest {
            0.0
        } else {
            -self.conductivity_w_mk * c1 / 1000.0
        };
        tracing::trace!(c1, c0, nhf, "temperature profile fit");

        let names = ["T4_K", "T8_K", "T12_K", "T16_K"];
        let mut channels: Vec<Channel> = names
            .iter()
            .zip(kelvin)
            .map(|(&name, value)| Channel { name, value })
            .collect();
        channels.push(Channel {
            name: "surface_temp_K",
            value: c0,
        });
        Ok(Reading {
            process_variable: nhf,
            channels,
        })
    }
}

// ── Gas analysis ─────────────────────────────────────────────────────────────

const GAS_CHANNELS: [&str; 9] = [
    "O2_%",
    "O2_inlet_%",
    "CO_ppm",
    "CO2_ppm",
    "DPT_volts",
    "APT_volts",
    "Duct_TC_K",
    "Ambient_TC_K",
    "RH_volts",
];

/// Appends calibrated gas-analyzer channels to another sensor's reading.
///
/// Gas channels are logged for heat-release calculations only; they never
/// reach the controller.
#[derive(Debug)]
pub struct WithGasChannels<S, G> {
    inner: S,
    analyzer: G,
    calibration: GasCalibration,
}

impl<S: ProcessSensor, G: GasAnalyzer> WithGasChannels<S, G> {
    pub fn new(inner: S, analyzer: G, calibration: GasCalibration) -> Self {
        Self {
            inner,
            analyzer,
            calibration,
        }
    }
}

impl<S: ProcessSensor, G: GasAnalyzer> ProcessSensor for WithGasChannels<S, G> {
    fn channel_names(&self) -> Vec<&'static str> {
        let mut names = self.inner.channel_names();
        names.extend(GAS_CHANNELS);
        names
    }

    fn sample(&mut self, t_s: f64, pretest: bool) -> Result<Reading, FpaError> {
        let mut reading = self.inner.sample(t_s, pretest)?;
        let g = self
            .analyzer
            .read_gases()
            .map_err(|e| map_hw_error(&*e, HwSide::Sensor))?;
        let cal = &self.calibration;
        let values = [
            cal.o2_percent.eval(g.o2_volts),
            cal.o2_inlet_percent.eval(g.o2_inlet_volts),
            cal.co_ppm.eval(g.co_volts),
            cal.co2_ppm.eval(g.co2_volts),
            g.dpt_volts,
            g.apt_volts,
            g.duct_tc_k,
            g.ambient_tc_k,
            g.rh_volts,
        ];
        reading.channels.extend(
            GAS_CHANNELS
                .iter()
                .zip(values)
                .map(|(&name, value)| Channel { name, value }),
        );
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_fit_recovers_exact_profile() {
        let xs = [0.004, 0.008, 0.012, 0.016];
        let f = |x: f64| 1.5e5 * x * x - 9.0e3 * x + 650.0;
        let ys = xs.map(f);
        let [c2, c1, c0] = fit_quadratic(&xs, &ys).unwrap();
        assert!((c2 - 1.5e5).abs() < 1e-3 * 1.5e5);
        assert!((c1 + 9.0e3).abs() < 1e-6 * 9.0e3);
        assert!((c0 - 650.0).abs() < 1e-6);
    }

    #[test]
    fn quadratic_fit_rejects_repeated_depths() {
        let xs = [0.01; 4];
        assert!(fit_quadratic(&xs, &[300.0, 301.0, 302.0, 303.0]).is_none());
    }

    #[test]
    fn quadratic_fit_rejects_two_distinct_depths() {
        let xs = [0.004, 0.004, 0.012, 0.012];
        assert!(fit_quadratic(&xs, &[310.0, 310.0, 305.0, 305.0]).is_none());
    }

    #[test]
    fn quadratic_fit_ignores_cubic_residual() {
        // [-1, 3, -3, 1] is orthogonal to 1, x and x^2 on equal spacing,
        // so the least-squares fit returns the underlying line.
        let xs = [0.004, 0.008, 0.012, 0.016];
        let wiggle = [-1.0, 3.0, -3.0, 1.0];
        let ys: [f64; 4] = std::array::from_fn(|i| 600.0 - 9.0e3 * xs[i] + 0.3 * wiggle[i]);
        let [c2, c1, c0] = fit_quadratic(&xs, &ys).unwrap();
        assert!(c2.abs() < 1.0, "c2 = {c2}");
        assert!((c1 + 9.0e3).abs() < 1e-6 * 9.0e3, "c1 = {c1}");
        assert!((c0 - 600.0).abs() < 1e-6);
    }

    #[test]
    fn round1_matches_one_decimal() {
        assert_eq!(round1(12.34), 12.3);
        assert_eq!(round1(-0.06), -0.1);
    }
}
