mod cli;
mod error_fmt;
mod run;
mod sink;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use fpa_core::{CalibrationStore, FpaError, Variant};
use fpa_traits::{GasAnalyzer, LampSupply, LoadCell, MonotonicClock, SampleThermocouples};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::{RunRequest, calibration_store, run_experiment, sim_params};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            variant,
            setpoint,
            test_id,
            material,
            yes,
            max_duration_s,
            output_dir,
        } => {
            let req = RunRequest {
                variant: variant.into(),
                setpoint,
                test_id,
                material,
                assume_yes: yes,
                max_duration_s,
                output_dir,
            };
            let Some(summary) = run_experiment(&cfg, &req, cli.json)? else {
                return Ok(());
            };
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "event": "experiment_finished",
                        "variant": req.variant.label(),
                        "setpoint": req.setpoint,
                        "summary": summary,
                        "duration_min": summary.duration_min(),
                    })
                );
            } else {
                println!("Experiment finished");
                println!("Duration: {:.2} min", summary.duration_min());
                if let Some(t) = summary.handover_at_s {
                    println!("PID took over at t = {t:.1} s");
                }
                if summary.failed_cycles > 0 {
                    println!("Skipped cycles: {}", summary.failed_cycles);
                }
            }
            Ok(())
        }
        Commands::Calibration => print_calibration(&cfg, cli.json),
        Commands::SelfCheck => self_check(&cfg),
    }
}

fn load_config(path: &Path) -> eyre::Result<fpa_config::Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FpaError::Config(format!("read {}: {e}", path.display())))?;
    let cfg = fpa_config::load_toml(&text)
        .map_err(|e| FpaError::Config(format!("parse {}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| FpaError::Config(e.to_string()))?;
    Ok(cfg)
}

/// Console layer on stderr (pretty or JSON) plus an optional JSON file layer.
///
/// `RUST_LOG` overrides `--log-level` for the console; the file layer uses
/// `[logging] level`.
fn init_tracing(json: bool, level: &str, logging: &fpa_config::Logging) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level '{level}'"))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
            .wrap_err("invalid logging.level")?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install tracing subscriber")
}

fn print_calibration(cfg: &fpa_config::Config, json: bool) -> eyre::Result<()> {
    let store = calibration_store(cfg);
    let lamp = store.load_latest().wrap_err("load lamp calibration")?;
    let gas = store.load_latest_gas().wrap_err("load gas calibration")?;
    if json {
        println!("{}", serde_json::json!({ "lamp": lamp, "gas": gas }));
        return Ok(());
    }
    println!("Lamp calibration (highest degree first)");
    println!("  heat flux -> voltage: {:?}", lamp.flux_to_volts.coeffs());
    println!("  voltage -> heat flux: {:?}", lamp.volts_to_flux.coeffs());
    match gas {
        Some(g) => {
            println!("Gas analyzer calibration (a, b)");
            for (name, p) in [
                ("O2", &g.o2_percent),
                ("O2 inlet", &g.o2_inlet_percent),
                ("CO", &g.co_ppm),
                ("CO2", &g.co2_ppm),
            ] {
                println!("  {name:<8} {:?}", p.coeffs());
            }
        }
        None => println!("Gas analyzer calibration: not configured"),
    }
    Ok(())
}

fn self_check(cfg: &fpa_config::Config) -> eyre::Result<()> {
    let store = calibration_store(cfg);
    store.load_latest().wrap_err("load lamp calibration")?;
    store.load_latest_gas().wrap_err("load gas calibration")?;

    let resolved = fpa_core::resolve(cfg, Variant::MassLossRate);
    let rig = fpa_hardware::SimRig::new(
        sim_params(cfg, &resolved),
        Arc::new(MonotonicClock::new()),
    );
    let map = |e: Box<dyn std::error::Error + Send + Sync>| eyre::eyre!(e);
    rig.load_cell()
        .read_mass()
        .map_err(map)
        .wrap_err("load cell")?;
    rig.thermocouples(resolved.sample.tc_depths_m)
        .read_profile()
        .map_err(map)
        .wrap_err("thermocouples")?;
    rig.gas_analyzer()
        .read_gases()
        .map_err(map)
        .wrap_err("gas analyzer")?;
    let mut lamps = rig.lamps();
    lamps.set_voltage(0.0).map_err(map).wrap_err("lamp supply")?;
    lamps.shutdown().map_err(map).wrap_err("lamp supply")?;
    println!("OK");
    Ok(())
}
