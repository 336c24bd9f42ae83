use fpa_config::load_toml;
use rstest::rstest;

#[test]
fn empty_file_is_a_valid_config() {
    let cfg = load_toml("").expect("parse empty TOML");
    cfg.validate().expect("defaults must validate");
    assert_eq!(cfg.loop_.period_ms, 100);
    assert_eq!(cfg.conditioning.window, 30);
    assert!((cfg.lamps.max_voltage - 4.5).abs() < 1e-12);
}

#[test]
fn accepts_full_config() {
    let toml = r#"
[loop]
period_ms = 100
pretest_s = 60.0
pre_delay_ms = 0
snapshot_every = 5

[pid]
kp = 0.2
ki = 0.04
kd = 0.2

[lamps]
min_voltage = 0.25
max_voltage = 4.5

[ramp]
rate_kw_m2_s = 0.25

[ramp.nhf]
handover_ratio = 0.95
min_ramp_s = 100.0

[conditioning]
window = 30
epsilon = 0.2

[sample]
surface_area_m2 = 0.01
conductivity_w_mk = 0.19
tc_depths_m = [0.004, 0.008, 0.012, 0.016]

[calibration]
lamp_dir = "calibration_data"
gas_dir = "hrr_calibration_data"

[logging]
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.ramp.nhf.min_ramp_s, Some(100.0));
    assert_eq!(cfg.ramp.mlr.min_ramp_s, None);
    assert_eq!(cfg.calibration.gas_dir.as_deref(), Some("hrr_calibration_data"));
}

#[rstest]
#[case("[loop]\nperiod_ms = 0", "loop.period_ms must be >= 1")]
#[case("[loop]\nsnapshot_every = 0", "loop.snapshot_every must be >= 1")]
#[case("[pid]\nkp = -0.1", "pid.kp must be a finite value >= 0")]
#[case("[lamps]\nmin_voltage = 5.0\nmax_voltage = 4.5", "lamps.min_voltage must be < lamps.max_voltage")]
#[case("[ramp]\nrate_kw_m2_s = 0.0", "ramp.rate_kw_m2_s must be > 0")]
#[case("[ramp.mlr]\nhandover_ratio = 1.5", "ramp.mlr.handover_ratio must be in (0.0, 1.0]")]
#[case("[ramp.nhf]\nmin_ramp_s = -1.0", "ramp.nhf.min_ramp_s must be >= 0")]
#[case("[conditioning]\nwindow = 0", "conditioning.window must be >= 1")]
#[case("[conditioning]\nepsilon = 1.0", "conditioning.epsilon must be in [0.0, 1.0)")]
#[case("[sample]\nsurface_area_m2 = 0.0", "sample.surface_area_m2 must be > 0")]
#[case("[sample]\ntc_depths_m = [0.004, 0.004, 0.012, 0.016]", "sample.tc_depths_m must be strictly increasing")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation must be one of")]
#[case("[sim]\nnoise = 0.9", "sim.noise must be in")]
fn rejects_out_of_range(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} should contain {needle}"
    );
}

#[test]
fn rejects_unknown_value_types() {
    assert!(load_toml("[pid]\nkp = \"fast\"").is_err());
}

#[test]
fn shipped_config_validates() {
    let cfg = load_toml(include_str!("../../etc/fpa_config.toml")).expect("parse etc config");
    cfg.validate().expect("etc config must validate");
    assert_eq!(cfg.calibration.gas_dir.as_deref(), Some("calibration_data/gas"));
}
