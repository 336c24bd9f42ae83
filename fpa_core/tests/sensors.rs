use std::collections::VecDeque;

use fpa_core::sensor::CELSIUS_TO_KELVIN;
use fpa_core::{
    FpaError, GasCalibration, MassLossRateSensor, NetHeatFluxSensor, Polynomial, ProcessSensor,
    WithGasChannels,
};
use fpa_traits::{GasAnalyzer, GasReadings, HwResult, LoadCell, SampleThermocouples};
use rstest::rstest;

struct ScriptedCell(VecDeque<HwResult<f64>>);

impl LoadCell for ScriptedCell {
    fn read_mass(&mut self) -> HwResult<f64> {
        self.0
            .pop_front()
            .unwrap_or_else(|| Err(Box::new(std::io::Error::other("script exhausted"))))
    }
}

fn cell(masses: &[f64]) -> ScriptedCell {
    ScriptedCell(masses.iter().map(|m| Ok(*m)).collect())
}

struct FixedProfile([f64; 4]);

impl SampleThermocouples for FixedProfile {
    fn read_profile(&mut self) -> HwResult<[f64; 4]> {
        Ok(self.0)
    }
}

struct FixedGases(GasReadings);

impl GasAnalyzer for FixedGases {
    fn read_gases(&mut self) -> HwResult<GasReadings> {
        Ok(self.0)
    }
}

#[rstest]
fn mass_loss_rate_from_successive_readings() {
    // 0.01 m2 sample losing 0.05 g every 0.5 s -> 10 g/m2s
    let mut s = MassLossRateSensor::new(cell(&[100.0, 99.95, 99.90]), 0.01);
    assert_eq!(s.sample(0.0, true).unwrap().process_variable, 0.0);
    let r = s.sample(0.5, false).unwrap();
    assert!((r.process_variable - 10.0).abs() < 1e-9);
    assert_eq!(r.channels[0].name, "mass_g");
    assert!((r.channels[0].value - 99.95).abs() < 1e-12);
    let r = s.sample(1.0, false).unwrap();
    assert!((r.process_variable - 10.0).abs() < 1e-9);
}

#[rstest]
fn mass_loss_rate_rounds_to_one_decimal() {
    let mut s = MassLossRateSensor::new(cell(&[10.0, 9.99876]), 0.01);
    s.sample(0.0, false).unwrap();
    let r = s.sample(1.0, false).unwrap();
    assert_eq!(r.process_variable, 0.1);
}

#[rstest]
fn mass_loss_rate_rejects_repeated_timestamp() {
    let mut s = MassLossRateSensor::new(cell(&[10.0, 9.9, 9.8]), 0.01);
    s.sample(1.0, false).unwrap();
    assert!(matches!(s.sample(1.0, false), Err(FpaError::SensorRead(_))));
    // the rejected reading does not become the new reference
    let r = s.sample(2.0, false).unwrap();
    assert!((r.process_variable - 20.0).abs() < 1e-9);
}

#[rstest]
fn load_cell_failure_maps_to_sensor_read() {
    let e: Box<dyn std::error::Error + Send + Sync> =
        Box::new(std::io::Error::other("checksum mismatch"));
    let mut s = MassLossRateSensor::new(ScriptedCell(VecDeque::from([Err(e)])), 0.01);
    assert!(matches!(s.sample(0.0, false), Err(FpaError::SensorRead(_))));
}

fn linear_profile_celsius(q_kw_m2: f64, k: f64, surface_c: f64) -> [f64; 4] {
    let gradient = -q_kw_m2 * 1000.0 / k; // K/m
    [0.004, 0.008, 0.012, 0.016].map(|x| surface_c + gradient * x)
}

#[rstest]
#[case(20.0)]
#[case(5.0)]
fn net_heat_flux_from_linear_profile(#[case] q: f64) {
    let depths = [0.004, 0.008, 0.012, 0.016];
    let mut s = NetHeatFluxSensor::new(FixedProfile(linear_profile_celsius(q, 0.19, 400.0)), depths, 0.19);
    let r = s.sample(10.0, false).unwrap();
    assert!((r.process_variable - q).abs() < 1e-6, "nhf {}", r.process_variable);

    let surface = r
        .channels
        .iter()
        .find(|c| c.name == "surface_temp_K")
        .unwrap()
        .value;
    assert!((surface - (400.0 + CELSIUS_TO_KELVIN)).abs() < 1e-6);
    assert_eq!(r.channels.len(), s.channel_names().len());
}

#[rstest]
#[case([0.01; 4])]
#[case([0.004, 0.004, 0.012, 0.012])]
fn degenerate_depths_are_a_sensor_read_fault(#[case] depths: [f64; 4]) {
    let profile = linear_profile_celsius(10.0, 0.19, 300.0);
    let mut s = NetHeatFluxSensor::new(FixedProfile(profile), depths, 0.19);
    let err = s.sample(5.0, false).unwrap_err();
    assert!(matches!(err, FpaError::SensorRead(_)), "got {err:?}");
    assert!(err.is_recoverable());
}

#[rstest]
fn net_heat_flux_is_zero_during_pretest_unless_disabled() {
    let depths = [0.004, 0.008, 0.012, 0.016];
    let profile = linear_profile_celsius(15.0, 0.19, 300.0);
    let mut s = NetHeatFluxSensor::new(FixedProfile(profile), depths, 0.19);
    assert_eq!(s.sample(0.0, true).unwrap().process_variable, 0.0);

    let mut s = NetHeatFluxSensor::new(FixedProfile(profile), depths, 0.19).zero_during_pretest(false);
    assert!((s.sample(0.0, true).unwrap().process_variable - 15.0).abs() < 1e-6);
}

#[rstest]
fn gas_channels_are_appended_and_calibrated() {
    let cal = GasCalibration {
        o2_percent: Polynomial::linear(2.0, 1.0).unwrap(),
        o2_inlet_percent: Polynomial::linear(2.0, 0.0).unwrap(),
        co_ppm: Polynomial::linear(100.0, 0.0).unwrap(),
        co2_ppm: Polynomial::linear(1000.0, 0.0).unwrap(),
    };
    let gases = GasReadings {
        o2_volts: 10.0,
        o2_inlet_volts: 10.5,
        co_volts: 0.2,
        co2_volts: 0.3,
        duct_tc_k: 310.0,
        ..GasReadings::default()
    };
    let inner = MassLossRateSensor::new(cell(&[5.0]), 0.01);
    let mut s = WithGasChannels::new(inner, FixedGases(gases), cal);

    let names = s.channel_names();
    assert_eq!(names[0], "mass_g");
    assert_eq!(names.len(), 10);

    let r = s.sample(0.0, false).unwrap();
    let get = |n: &str| r.channels.iter().find(|c| c.name == n).unwrap().value;
    assert_eq!(get("O2_%"), 21.0);
    assert_eq!(get("O2_inlet_%"), 21.0);
    assert!((get("CO_ppm") - 20.0).abs() < 1e-9);
    assert!((get("CO2_ppm") - 300.0).abs() < 1e-9);
    assert_eq!(get("Duct_TC_K"), 310.0);
}
