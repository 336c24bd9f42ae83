//! Calibration artifacts produced by the daily lamp and gas-analyzer calibrations.
//!
//! Lamp CSV schema (one row per coefficient, highest degree first):
//!
//! ```text
//! coefficients_heatflux_to_voltage,coefficients_voltage_to_heatflux
//! 0.0012,1.9
//! 0.071,12.4
//! 0.31,-2.8
//! ```
//!
//! Gas CSV schema (rows in order O2, O2 inlet, CO, CO2; value = a*volts + b):
//!
//! ```text
//! coeff_a,coeff_b
//! 4.2,0.1
//! ```
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Copy)]
struct LampRow {
    coefficients_heatflux_to_voltage: f64,
    coefficients_voltage_to_heatflux: f64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct GasRow {
    coeff_a: f64,
    coeff_b: f64,
}

/// Raw polynomial coefficients as stored in the lamp calibration file.
#[derive(Debug, Clone, PartialEq)]
pub struct LampCoefficients {
    /// Heat flux (kW/m2) -> lamp voltage (V), highest degree first.
    pub flux_to_volts: Vec<f64>,
    /// Lamp voltage (V) -> heat flux (kW/m2), highest degree first.
    pub volts_to_flux: Vec<f64>,
}

/// Linear fits (a, b) for the gas channels: O2, O2 inlet, CO, CO2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasCoefficients {
    pub o2: (f64, f64),
    pub o2_inlet: (f64, f64),
    pub co: (f64, f64),
    pub co2: (f64, f64),
}

/// Most recently modified file in `dir` whose extension matches `ext`.
///
/// Returns `Ok(None)` when the directory holds no matching file.
pub fn latest_calibration_file(dir: &Path, ext: &str) -> eyre::Result<Option<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| eyre::eyre!("read calibration dir {:?}: {}", dir, e))?;
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|e| eyre::eyre!("list calibration dir {:?}: {}", dir, e))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case(ext));
        if !matches || !path.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| eyre::eyre!("stat {:?}: {}", path, e))?;
        // Ties broken by name so the choice is stable.
        let newer = match &best {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

fn check_headers(rdr: &mut csv::Reader<std::fs::File>, path: &Path, expected: &[&str]) -> eyre::Result<()> {
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.trim().to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers '{}', got: {}",
            expected.join(","),
            actual.join(",")
        );
    }
    Ok(())
}

pub fn load_lamp_calibration_csv(path: &Path) -> eyre::Result<LampCoefficients> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;
    check_headers(
        &mut rdr,
        path,
        &[
            "coefficients_heatflux_to_voltage",
            "coefficients_voltage_to_heatflux",
        ],
    )?;

    let mut out = LampCoefficients {
        flux_to_volts: Vec::new(),
        volts_to_flux: Vec::new(),
    };
    for (idx, rec) in rdr.deserialize::<LampRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !(row.coefficients_heatflux_to_voltage.is_finite()
            && row.coefficients_voltage_to_heatflux.is_finite())
        {
            eyre::bail!("non-finite coefficient in CSV row {}", idx + 2);
        }
        out.flux_to_volts.push(row.coefficients_heatflux_to_voltage);
        out.volts_to_flux.push(row.coefficients_voltage_to_heatflux);
    }
    if out.flux_to_volts.is_empty() {
        eyre::bail!("calibration CSV {:?} has no coefficient rows", path);
    }
    Ok(out)
}

pub fn load_gas_calibration_csv(path: &Path) -> eyre::Result<GasCoefficients> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open gas calibration CSV {:?}: {}", path, e))?;
    check_headers(&mut rdr, path, &["coeff_a", "coeff_b"])?;

    let mut fits = Vec::with_capacity(4);
    for (idx, rec) in rdr.deserialize::<GasRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        fits.push((row.coeff_a, row.coeff_b));
    }
    match fits.as_slice() {
        [o2, o2_inlet, co, co2] => Ok(GasCoefficients {
            o2: *o2,
            o2_inlet: *o2_inlet,
            co: *co,
            co2: *co2,
        }),
        other => eyre::bail!(
            "gas calibration requires exactly 4 rows (O2, O2 inlet, CO, CO2), got {}",
            other.len()
        ),
    }
}
