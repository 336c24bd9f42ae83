use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use fpa_core::mocks::{RecordingLamps, ScriptedSensor};
use fpa_core::{
    ConditioningCfg, Experiment, FpaError, LampCalibration, LoopCfg, Marker, MemorySink,
    Polynomial, Stage,
};
use fpa_traits::ManualClock;
use rstest::rstest;

/// 10 kW/m2 per volt, both ways.
fn linear_cal() -> LampCalibration {
    LampCalibration::new(
        Polynomial::linear(0.1, 0.0).unwrap(),
        Polynomial::linear(10.0, 0.0).unwrap(),
    )
}

fn timing(pretest_s: f64) -> LoopCfg {
    LoopCfg {
        period_ms: 100,
        pretest_s,
        pre_delay_ms: 0,
        snapshot_every: 1,
    }
}

/// Stop check that trips after `n` polls.
fn stop_after(n: u32) -> impl Fn() -> bool {
    let polls = Rc::new(Cell::new(0u32));
    move || {
        polls.set(polls.get() + 1);
        polls.get() >= n
    }
}

struct Rig {
    sink: MemorySink,
    lamps: RecordingLamps,
    clock: ManualClock,
}

fn rig() -> Rig {
    Rig {
        sink: MemorySink::new(),
        lamps: RecordingLamps::new(),
        clock: ManualClock::new(),
    }
}

fn experiment(r: &Rig, sensor: ScriptedSensor, pretest_s: f64, cycles: u32) -> Experiment {
    Experiment::builder()
        .with_sensor(sensor)
        .with_lamps(r.lamps.clone())
        .with_setpoint(10.0)
        .with_sink(r.sink.clone())
        .with_calibration(linear_cal())
        .with_timing(timing(pretest_s))
        .with_clock(Box::new(r.clock.clone()))
        .with_stop_check(stop_after(cycles))
        .build()
        .expect("experiment build")
}

#[rstest]
fn failed_sensor_cycle_drops_exactly_one_row() {
    let r = rig();
    let mut script: Vec<Option<f64>> = vec![Some(1.0); 10];
    script[4] = None;
    let mut exp = experiment(&r, ScriptedSensor::new(script), 0.0, 10);

    let summary = exp.run().expect("run");
    assert_eq!(summary.cycles, 10);
    assert_eq!(summary.rows, 9);
    assert_eq!(summary.failed_cycles, 1);

    let rows = r.sink.data_rows();
    assert_eq!(rows.len(), 9);
    let times: Vec<f64> = rows.iter().map(|r| r.time_s).collect();
    assert!(times.windows(2).all(|w| w[1] > w[0]), "times not increasing: {times:?}");
    // The missing cycle leaves a single 0.2 s step; everything else is one period.
    let gaps: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps.iter().filter(|g| (**g - 0.2).abs() < 1e-9).count(), 1);
    assert_eq!(gaps.iter().filter(|g| (**g - 0.1).abs() < 1e-9).count(), 7);
    assert!(!rows.iter().any(|r| r.cycle == 4));
}

#[rstest]
fn shutdown_writes_sentinel_and_zeroes_lamps() {
    let r = rig();
    let mut exp = experiment(&r, ScriptedSensor::constant(2.0), 0.0, 3);
    exp.run().expect("run");

    let all = r.sink.rows();
    let last = all.last().expect("sentinel");
    assert_eq!(last.marker, Some(Marker::EndTest));
    assert!(r.sink.is_finished());

    let log = r.lamps.log();
    assert_eq!(log.commands.len(), 4);
    assert_eq!(log.commands.last().copied(), Some(0.0));
    assert_eq!(log.shutdowns, 1);
}

#[rstest]
fn stop_during_pretest_never_drives_lamps() {
    let r = rig();
    let mut exp = experiment(&r, ScriptedSensor::constant(0.0), 60.0, 3);
    let summary = exp.run().expect("run");

    assert_eq!(summary.rows, 3);
    assert_eq!(summary.handover_at_s, None);
    let rows = r.sink.data_rows();
    assert!(rows.iter().all(|r| r.stage == Stage::Pretest && r.lamp_volts == 0.0));
    assert_eq!(rows[0].marker, Some(Marker::StartLogging));
    assert_eq!(r.lamps.log().commands, vec![0.0]);
    assert_eq!(r.sink.rows().last().map(|r| r.stage), Some(Stage::Pretest));
}

#[rstest]
fn markers_split_baseline_from_test() {
    let r = rig();
    let mut exp = experiment(&r, ScriptedSensor::constant(1.0), 0.25, 6);
    exp.run().expect("run");

    let rows = r.sink.data_rows();
    let stages: Vec<Stage> = rows.iter().map(|r| r.stage).collect();
    assert_eq!(&stages[..3], &[Stage::Pretest; 3]);
    assert_eq!(rows[0].marker, Some(Marker::StartLogging));
    assert_eq!(rows[3].marker, Some(Marker::StartTest));
    assert_eq!(rows[3].stage, Stage::Ramping);
    assert!(rows[4..].iter().all(|r| r.marker.is_none()));
}

#[rstest]
fn lamp_fault_is_fatal_but_still_shuts_down() {
    let r = Rig {
        lamps: RecordingLamps::failing_after(2),
        ..rig()
    };
    let mut exp = experiment(&r, ScriptedSensor::constant(1.0), 0.0, 100);
    let err = exp.run().expect_err("lamp fault must end the run");

    let typed = err.chain().find_map(|e| e.downcast_ref::<FpaError>());
    assert!(
        matches!(typed, Some(FpaError::ActuatorWrite(_))),
        "got {err:?}"
    );
    assert_eq!(exp.summary().rows, 2);
    assert_eq!(r.lamps.log().shutdowns, 1);
    assert!(r.sink.is_finished());
}

#[rstest]
fn duration_cap_stops_the_run() {
    let r = rig();
    let mut exp = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(r.lamps.clone())
        .with_setpoint(10.0)
        .with_sink(r.sink.clone())
        .with_calibration(linear_cal())
        .with_timing(timing(0.0))
        .with_clock(Box::new(r.clock.clone()))
        .with_max_duration_s(1.0)
        .build()
        .unwrap();
    let summary = exp.run().unwrap();
    assert_eq!(summary.cycles, 11);
    assert!((summary.duration_s - 1.0).abs() < 1e-9);
}

#[rstest]
#[case(1, 5 + 1)]
#[case(2, 2 + 1)]
#[case(0, 1)]
fn snapshots_follow_configured_cadence(#[case] every: u32, #[case] expected: usize) {
    let r = rig();
    let mut exp = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(r.lamps.clone())
        .with_setpoint(10.0)
        .with_sink(r.sink.clone())
        .with_calibration(linear_cal())
        .with_timing(LoopCfg {
            snapshot_every: every,
            ..timing(0.0)
        })
        .with_clock(Box::new(r.clock.clone()))
        .with_stop_check(stop_after(5))
        .build()
        .unwrap();
    exp.run().unwrap();
    // cadence during the run, plus the final snapshot at shutdown
    assert_eq!(r.sink.snapshots(), expected);
}

#[rstest]
fn handover_inside_the_loop_is_seamless() {
    let r = rig();
    let mut exp = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(10.0))
        .with_lamps(r.lamps.clone())
        .with_setpoint(10.0)
        .with_sink(r.sink.clone())
        .with_calibration(linear_cal())
        .with_conditioning(ConditioningCfg {
            window: 1,
            ..ConditioningCfg::default()
        })
        .with_timing(timing(0.0))
        .with_clock(Box::new(r.clock.clone()))
        .with_stop_check(stop_after(4))
        .build()
        .unwrap();
    let summary = exp.run().unwrap();

    assert_eq!(summary.handover_at_s, Some(0.0));
    let cmds = r.lamps.log().commands;
    // ramp at t=0 sits on the lower bound; the PID holds it there
    assert_eq!(&cmds[..4], &[0.25; 4]);
    let rows = r.sink.data_rows();
    assert_eq!(rows[0].stage, Stage::Ramping);
    assert!(rows[1..].iter().all(|r| r.stage == Stage::Controlling));
}

#[rstest]
fn pre_delay_sleeps_before_logging_starts() {
    let r = rig();
    let mut exp = Experiment::builder()
        .with_sensor(ScriptedSensor::constant(1.0))
        .with_lamps(r.lamps.clone())
        .with_setpoint(10.0)
        .with_sink(r.sink.clone())
        .with_calibration(linear_cal())
        .with_timing(LoopCfg {
            pre_delay_ms: 2000,
            ..timing(0.0)
        })
        .with_clock(Box::new(r.clock.clone()))
        .with_stop_check(stop_after(2))
        .build()
        .unwrap();
    exp.run().unwrap();
    assert!(r.clock.elapsed() >= Duration::from_millis(2100));
    assert_eq!(r.sink.data_rows()[0].time_s, 0.0);
}

#[rstest]
fn progress_hook_sees_every_row() {
    let r = rig();
    let seen = Rc::new(Cell::new(0usize));
    let seen_in_hook = Rc::clone(&seen);
    let mut script = vec![Some(1.0); 6];
    script[2] = None;
    let mut exp = Experiment::builder()
        .with_sensor(ScriptedSensor::new(script))
        .with_lamps(r.lamps.clone())
        .with_setpoint(10.0)
        .with_sink(r.sink.clone())
        .with_calibration(linear_cal())
        .with_timing(timing(0.0))
        .with_clock(Box::new(r.clock.clone()))
        .with_stop_check(stop_after(6))
        .with_progress(move |_| seen_in_hook.set(seen_in_hook.get() + 1))
        .build()
        .unwrap();
    exp.run().unwrap();
    assert_eq!(seen.get(), 5);
}
