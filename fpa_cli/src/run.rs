//! Experiment assembly and execution on the simulated rig.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::WrapErr;
use fpa_core::{
    CalibrationStore, DirCalibrationStore, Experiment, GasCalibration, MassLossRateSensor,
    NetHeatFluxSensor, ProcessSensor, Resolved, RunSummary, SampleRecord, Tee, Variant,
    WithGasChannels,
};
use fpa_hardware::{SimParams, SimRig};
use fpa_traits::MonotonicClock;

use crate::sink::{CsvSink, JsonSnapshotSink, create_experiment_dir, experiment_name};

/// Operator inputs for one experiment.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub variant: Variant,
    pub setpoint: f64,
    pub test_id: String,
    pub material: String,
    pub assume_yes: bool,
    pub max_duration_s: Option<f64>,
    pub output_dir: Option<PathBuf>,
}

/// Directory-backed calibration store as configured.
pub fn calibration_store(cfg: &fpa_config::Config) -> DirCalibrationStore {
    let store = DirCalibrationStore::new(&cfg.calibration.lamp_dir);
    match &cfg.calibration.gas_dir {
        Some(dir) => store.with_gas_dir(dir),
        None => store,
    }
}

pub fn sim_params(cfg: &fpa_config::Config, resolved: &Resolved) -> SimParams {
    SimParams {
        noise: cfg.sim.noise,
        seed: cfg.sim.seed,
        initial_mass_g: cfg.sim.initial_mass_g,
        area_m2: resolved.sample.surface_area_m2,
        conductivity_w_mk: resolved.sample.conductivity_w_mk,
        ..SimParams::default()
    }
}

/// Process sensor for `variant`, with gas channels attached when a gas
/// calibration is available.
pub fn make_sensor(
    rig: &SimRig,
    variant: Variant,
    resolved: &Resolved,
    gas: Option<GasCalibration>,
) -> Box<dyn ProcessSensor> {
    let sample = &resolved.sample;
    let base: Box<dyn ProcessSensor> = match variant {
        Variant::MassLossRate => Box::new(MassLossRateSensor::new(
            rig.load_cell(),
            sample.surface_area_m2,
        )),
        Variant::NetHeatFlux => Box::new(
            NetHeatFluxSensor::new(
                rig.thermocouples(sample.tc_depths_m),
                sample.tc_depths_m,
                sample.conductivity_w_mk,
            )
            .zero_during_pretest(sample.nhf_pretest_zero),
        ),
    };
    match gas {
        Some(cal) => Box::new(WithGasChannels::new(base, rig.gas_analyzer(), cal)),
        None => base,
    }
}

fn confirm(req: &RunRequest, folder: &str) -> eyre::Result<bool> {
    println!("Experiment:   {folder}");
    println!("Variant:      {}", req.variant);
    println!("Setpoint:     {} {}", req.setpoint, req.variant.unit());
    println!("Test number:  {}", req.test_id);
    println!("Material:     {}", req.material);
    if req.assume_yes {
        return Ok(true);
    }
    print!("Proceed? [y/N] ");
    std::io::stdout().flush().wrap_err("flush stdout")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .wrap_err("read confirmation")?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn progress_line(unit: &'static str) -> impl FnMut(&SampleRecord) {
    move |r| {
        println!(
            "t = {:>7.1} s  {:<11}  pv = {:>7.2} {unit}  smoothed = {:>7.2}  lamps = {:.3} V ({:.1} kW/m2)",
            r.time_s,
            r.stage.as_str(),
            r.pv_raw,
            r.pv_smoothed,
            r.lamp_volts,
            r.ihf_kw_m2
        );
    }
}

/// Run one experiment. `Ok(None)` when the operator declined to start.
pub fn run_experiment(
    cfg: &fpa_config::Config,
    req: &RunRequest,
    json: bool,
) -> eyre::Result<Option<RunSummary>> {
    let resolved = fpa_core::resolve(cfg, req.variant);
    let name = experiment_name(req.variant, &req.test_id, &req.material, req.setpoint);

    if !confirm(req, &name)? {
        println!("Aborted by operator.");
        return Ok(None);
    }

    // Calibration first, so a missing file leaves no empty output folder.
    let store = calibration_store(cfg);
    let calibration = store.load_latest().wrap_err("load lamp calibration")?;
    let gas = store
        .load_latest_gas()
        .wrap_err("load gas calibration")?;

    let parent = req
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.output.dir));
    let folder = create_experiment_dir(&parent, &name)?;
    tracing::info!(folder = %folder.display(), "output folder created");

    let rig = SimRig::new(sim_params(cfg, &resolved), Arc::new(MonotonicClock::new()));
    let sensor = make_sensor(&rig, req.variant, &resolved, gas);
    let csv = CsvSink::create(&folder.join(format!("{name}.csv")), sensor.channel_names())
        .wrap_err("create experiment log")?;
    let snapshots = JsonSnapshotSink::new(folder.join(format!("{name}.json")));

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        }) {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
        }
    }

    let mut builder = Experiment::builder()
        .with_sensor(sensor)
        .with_lamps(rig.lamps())
        .with_setpoint(req.setpoint)
        .with_sink(Tee(csv, snapshots))
        .with_calibration(calibration)
        .with_resolved(&resolved)
        .with_stop_check(move || stop.load(Ordering::SeqCst));
    if !json {
        builder = builder.with_progress(progress_line(req.variant.unit()));
    }
    if let Some(max) = req.max_duration_s {
        builder = builder.with_max_duration_s(max);
    }
    let mut experiment = builder.build()?;

    if !json {
        println!("Press Ctrl-C to stop the experiment.");
    }
    let summary = experiment.run()?;
    Ok(Some(summary))
}
