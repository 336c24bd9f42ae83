use fpa_core::error::BuildError;
use fpa_core::mocks::{RecordingLamps, ScriptedSensor};
use fpa_core::{
    ActuatorBounds, ConditioningCfg, DirCalibrationStore, Experiment, FpaError, LampCalibration,
    MemorySink, Polynomial, StaticCalibration,
};
use rstest::rstest;

fn cal() -> LampCalibration {
    LampCalibration::new(
        Polynomial::linear(0.1, 0.0).unwrap(),
        Polynomial::linear(10.0, 0.0).unwrap(),
    )
}

#[rstest]
fn missing_sensor_yields_typed_build_error() {
    let err = Experiment::builder()
        // missing with_sensor()
        .with_lamps(RecordingLamps::new())
        .with_setpoint(10.0)
        .with_sink(MemorySink::new())
        .with_calibration(cal())
        .try_build()
        .expect_err("should fail with MissingSensor");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingSensor) => {}
        other => panic!("expected MissingSensor, got: {other:?}"),
    }
}

#[rstest]
fn missing_calibration_is_reported() {
    let err = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(RecordingLamps::new())
        .with_setpoint(10.0)
        .with_sink(MemorySink::new())
        .build()
        .expect_err("no calibration");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingCalibration)
    ));
}

#[rstest]
fn missing_sink_is_reported() {
    let err = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(RecordingLamps::new())
        .with_setpoint(10.0)
        .with_calibration(cal())
        .build()
        .expect_err("no sink");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingSink)
    ));
}

#[rstest]
#[case(0.0)]
#[case(-5.0)]
#[case(f64::NAN)]
fn non_positive_setpoint_is_invalid(#[case] setpoint: f64) {
    let err = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(RecordingLamps::new())
        .with_setpoint(setpoint)
        .with_sink(MemorySink::new())
        .with_calibration(cal())
        .build()
        .expect_err("invalid setpoint");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[rstest]
#[case(ActuatorBounds { min: 4.5, max: 0.25 })]
#[case(ActuatorBounds { min: 1.0, max: 1.0 })]
#[case(ActuatorBounds { min: f64::NEG_INFINITY, max: 1.0 })]
fn inverted_bounds_are_invalid(#[case] bounds: ActuatorBounds) {
    let res = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(RecordingLamps::new())
        .with_setpoint(10.0)
        .with_sink(MemorySink::new())
        .with_calibration(cal())
        .with_bounds(bounds)
        .build();
    assert!(res.is_err());
}

#[rstest]
fn zero_window_is_invalid() {
    let res = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(RecordingLamps::new())
        .with_setpoint(10.0)
        .with_sink(MemorySink::new())
        .with_calibration(cal())
        .with_conditioning(ConditioningCfg {
            window: 0,
            ..ConditioningCfg::default()
        })
        .build();
    assert!(res.is_err());
}

#[rstest]
fn calibration_store_feeds_the_builder() {
    let builder = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(RecordingLamps::new())
        .with_setpoint(10.0)
        .with_sink(MemorySink::new())
        .with_calibration_from(&StaticCalibration(cal()))
        .unwrap();
    let exp = builder.build().unwrap();
    assert_eq!(exp.machine().calibration(), &cal());
}

#[rstest]
fn empty_calibration_dir_is_no_calibration_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = Experiment::builder()
        .with_calibration_from(&DirCalibrationStore::new(dir.path()))
        .map(|_| ())
        .expect_err("empty dir");
    assert!(matches!(
        err.downcast_ref::<FpaError>(),
        Some(FpaError::NoCalibrationFound(_))
    ));
}
