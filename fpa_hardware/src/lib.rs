//! Instrument backends for the FPA controller.
//!
//! Only a simulated rig ships here: one shared physical state (lamp voltage,
//! sample heat flux, sample mass) observed through per-instrument handles
//! that implement the `fpa_traits` traits. Time comes from an injected
//! `Clock`, so tests can drive the rig with a `ManualClock`.

pub mod error;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use fpa_traits::clock::Clock;
use fpa_traits::{
    GasAnalyzer, GasReadings, HwResult, LampSupply, LoadCell, SampleThermocouples,
};

use crate::error::HwError;

/// Physical constants of the simulated apparatus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Incident flux per lamp volt (kW/m2 per V).
    pub lamp_gain_kw_m2_per_v: f64,
    /// Hard limit of the lamp supply; commands above it are refused.
    pub supply_limit_v: f64,
    /// Fraction of the incident flux the surface nets at steady state.
    pub absorbed_fraction: f64,
    /// First-order response time of the surface heat flux (s).
    pub response_tau_s: f64,
    /// Net flux below which the sample does not pyrolyse (kW/m2).
    pub critical_nhf_kw_m2: f64,
    /// Mass-loss rate per kW/m2 of net flux above critical (g/m2s).
    pub mlr_per_kw_m2: f64,
    pub area_m2: f64,
    pub initial_mass_g: f64,
    pub conductivity_w_mk: f64,
    /// Depth at which the sample stays at ambient temperature (m).
    pub penetration_m: f64,
    pub ambient_c: f64,
    /// Peak-to-peak measurement noise as a fraction of each reading.
    pub noise: f64,
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            lamp_gain_kw_m2_per_v: 10.0,
            supply_limit_v: 5.0,
            absorbed_fraction: 0.75,
            response_tau_s: 8.0,
            critical_nhf_kw_m2: 8.0,
            mlr_per_kw_m2: 0.8,
            area_m2: 0.01,
            initial_mass_g: 250.0,
            conductivity_w_mk: 0.19,
            penetration_m: 0.02,
            ambient_c: 20.0,
            noise: 0.0,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug)]
struct RigState {
    params: SimParams,
    lamp_volts: f64,
    nhf_kw_m2: f64,
    mass_g: f64,
    last_update: Instant,
    rng: u64,
    pending_faults: u32,
    connected: bool,
}

impl RigState {
    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        if dt <= 0.0 {
            return;
        }
        self.last_update = now;
        let p = &self.params;
        let target = p.absorbed_fraction * p.lamp_gain_kw_m2_per_v * self.lamp_volts;
        let k = 1.0 - (-dt / p.response_tau_s.max(1e-3)).exp();
        self.nhf_kw_m2 += (target - self.nhf_kw_m2) * k;
        let mlr = self.mlr();
        self.mass_g = (self.mass_g - mlr * p.area_m2 * dt).max(0.0);
    }

    fn mlr(&self) -> f64 {
        if self.mass_g <= 0.0 {
            return 0.0;
        }
        (self.nhf_kw_m2 - self.params.critical_nhf_kw_m2).max(0.0) * self.params.mlr_per_kw_m2
    }

    // xorshift64*, uniform in [0, 1)
    fn next_unit(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        (x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn jitter(&mut self, value: f64) -> f64 {
        if self.params.noise <= 0.0 {
            return value;
        }
        value * (1.0 + self.params.noise * (self.next_unit() - 0.5))
    }

    fn check_read(&mut self) -> error::Result<()> {
        if !self.connected {
            return Err(HwError::Disconnected);
        }
        if self.pending_faults > 0 {
            self.pending_faults -= 1;
            return Err(HwError::Timeout);
        }
        Ok(())
    }
}

/// Shared simulated apparatus. Clones observe the same physical state.
#[derive(Clone)]
pub struct SimRig {
    state: Rc<RefCell<RigState>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for SimRig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("SimRig")
            .field("lamp_volts", &s.lamp_volts)
            .field("nhf_kw_m2", &s.nhf_kw_m2)
            .field("mass_g", &s.mass_g)
            .finish()
    }
}

impl SimRig {
    pub fn new(params: SimParams, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let state = RigState {
            params,
            lamp_volts: 0.0,
            nhf_kw_m2: 0.0,
            mass_g: params.initial_mass_g,
            last_update: clock.now(),
            rng: params.seed.max(1),
            pending_faults: 0,
            connected: true,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            clock,
        }
    }

    pub fn params(&self) -> SimParams {
        self.state.borrow().params
    }

    pub fn lamps(&self) -> SimLamps {
        SimLamps { rig: self.clone() }
    }

    pub fn load_cell(&self) -> SimLoadCell {
        SimLoadCell { rig: self.clone() }
    }

    pub fn thermocouples(&self, depths_m: [f64; 4]) -> SimThermocouples {
        SimThermocouples {
            rig: self.clone(),
            depths_m,
        }
    }

    pub fn gas_analyzer(&self) -> SimGasAnalyzer {
        SimGasAnalyzer { rig: self.clone() }
    }

    /// Make the next `n` instrument reads time out.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.borrow_mut().pending_faults = n;
    }

    pub fn lamp_volts(&self) -> f64 {
        self.state.borrow().lamp_volts
    }

    /// True net heat flux at the surface right now (kW/m2).
    pub fn net_heat_flux(&self) -> f64 {
        self.update().nhf_kw_m2
    }

    /// True mass-loss rate right now (g/m2s).
    pub fn mass_loss_rate(&self) -> f64 {
        self.update().mlr()
    }

    pub fn mass_g(&self) -> f64 {
        self.update().mass_g
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn update(&self) -> std::cell::RefMut<'_, RigState> {
        let now = self.clock.now();
        let mut s = self.state.borrow_mut();
        s.advance(now);
        s
    }
}

/// Lamp power supply handle.
#[derive(Debug, Clone)]
pub struct SimLamps {
    rig: SimRig,
}

impl LampSupply for SimLamps {
    fn set_voltage(&mut self, volts: f64) -> HwResult<()> {
        let mut s = self.rig.update();
        if !s.connected {
            return Err(Box::new(HwError::Disconnected));
        }
        if !volts.is_finite() || volts < 0.0 || volts > s.params.supply_limit_v {
            return Err(Box::new(HwError::Protocol(format!(
                "voltage {volts} outside supply range 0..={}",
                s.params.supply_limit_v
            ))));
        }
        s.lamp_volts = volts;
        tracing::trace!(volts, "sim lamps set");
        Ok(())
    }

    fn shutdown(&mut self) -> HwResult<()> {
        let mut s = self.rig.update();
        s.lamp_volts = 0.0;
        s.connected = false;
        tracing::debug!("sim lamp supply released");
        Ok(())
    }
}

/// Load cell under the sample holder.
#[derive(Debug, Clone)]
pub struct SimLoadCell {
    rig: SimRig,
}

impl LoadCell for SimLoadCell {
    fn read_mass(&mut self) -> HwResult<f64> {
        let mut s = self.rig.update();
        s.check_read()?;
        let m = s.mass_g;
        Ok(s.jitter(m))
    }
}

/// In-depth thermocouples; reports a steady conduction profile for the
/// current net flux.
#[derive(Debug, Clone)]
pub struct SimThermocouples {
    rig: SimRig,
    depths_m: [f64; 4],
}

impl SampleThermocouples for SimThermocouples {
    fn read_profile(&mut self) -> HwResult<[f64; 4]> {
        let mut s = self.rig.update();
        s.check_read()?;
        let p = s.params;
        let gradient = s.nhf_kw_m2 * 1000.0 / p.conductivity_w_mk;
        let mut out = [0.0; 4];
        for (o, x) in out.iter_mut().zip(self.depths_m) {
            let t = p.ambient_c + gradient * (p.penetration_m - x).max(0.0);
            *o = s.jitter(t);
        }
        Ok(out)
    }
}

/// Gas analysis train. Channel voltages follow the simulated burning rate
/// through the inverse of a unit-slope calibration (see `SimGasAnalyzer::COEFFICIENTS`).
#[derive(Debug, Clone)]
pub struct SimGasAnalyzer {
    rig: SimRig,
}

impl SimGasAnalyzer {
    /// Linear `(a, b)` fits the simulated channels are generated with,
    /// in the order O2, O2 inlet, CO, CO2.
    pub const COEFFICIENTS: [(f64, f64); 4] = [(2.0, 0.0), (2.0, 0.0), (100.0, 0.0), (1000.0, 0.0)];
}

impl GasAnalyzer for SimGasAnalyzer {
    fn read_gases(&mut self) -> HwResult<GasReadings> {
        let mut s = self.rig.update();
        s.check_read()?;
        let mlr = s.mlr();
        let o2_pct = 20.95 - 0.15 * mlr;
        let co_ppm = 5.0 + 20.0 * mlr;
        let co2_ppm = 400.0 + 800.0 * mlr;
        let [o2, o2_in, co, co2] = Self::COEFFICIENTS;
        Ok(GasReadings {
            o2_volts: s.jitter(o2_pct / o2.0),
            dpt_volts: s.jitter(1.2),
            co_volts: s.jitter(co_ppm / co.0),
            co2_volts: s.jitter(co2_ppm / co2.0),
            apt_volts: s.jitter(2.5),
            o2_inlet_volts: 20.95 / o2_in.0,
            rh_volts: s.jitter(0.45),
            duct_tc_k: s.jitter(duct_temperature_k(mlr)),
            ambient_tc_k: 293.0,
        })
    }
}

fn duct_temperature_k(mlr: f64) -> f64 {
    295.0 + 4.0 * mlr
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpa_traits::ManualClock;
    use std::time::Duration;

    fn rig() -> (SimRig, ManualClock) {
        let clock = ManualClock::new();
        (SimRig::new(SimParams::default(), Arc::new(clock.clone())), clock)
    }

    #[test]
    fn flux_follows_lamp_command() {
        let (rig, clock) = rig();
        rig.lamps().set_voltage(2.0).unwrap();
        clock.advance(Duration::from_secs(120));
        // 0.75 * 10 * 2.0
        assert!((rig.net_heat_flux() - 15.0).abs() < 1e-3);
    }

    #[test]
    fn sample_loses_mass_above_critical_flux() {
        let (rig, clock) = rig();
        let m0 = rig.mass_g();
        rig.lamps().set_voltage(4.0).unwrap();
        clock.advance(Duration::from_secs(300));
        assert!(rig.mass_g() < m0);
        assert!(rig.mass_loss_rate() > 0.0);
    }

    #[test]
    fn injected_faults_time_out() {
        let (rig, _clock) = rig();
        rig.fail_next_reads(1);
        let err = rig.load_cell().read_mass().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HwError>(),
            Some(HwError::Timeout)
        ));
        assert!(rig.load_cell().read_mass().is_ok());
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let clock = ManualClock::new();
        let rig = SimRig::new(
            SimParams {
                noise: 0.02,
                ..SimParams::default()
            },
            Arc::new(clock),
        );
        let mut cell = rig.load_cell();
        for _ in 0..1000 {
            let m = cell.read_mass().unwrap();
            assert!((m - 250.0).abs() <= 250.0 * 0.01 + 1e-9);
        }
    }
}
