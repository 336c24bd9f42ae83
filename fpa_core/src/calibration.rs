//! Lamp and gas-analyzer calibration models.
//!
//! Polynomials are stored highest degree first, the order the calibration
//! spreadsheets use, and evaluated with Horner's rule.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::FpaError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Build from coefficients, highest degree first. Rejects empty or non-finite input.
    pub fn new(coeffs: Vec<f64>) -> Result<Self, FpaError> {
        if coeffs.is_empty() {
            return Err(FpaError::Calibration("polynomial has no coefficients".into()));
        }
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(FpaError::Calibration(
                "polynomial has non-finite coefficients".into(),
            ));
        }
        Ok(Self { coeffs })
    }

    /// First-order fit `a*x + b`.
    pub fn linear(a: f64, b: f64) -> Result<Self, FpaError> {
        Self::new(vec![a, b])
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Heat flux <-> lamp voltage maps from the latest lamp calibration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LampCalibration {
    pub flux_to_volts: Polynomial,
    pub volts_to_flux: Polynomial,
}

impl LampCalibration {
    pub fn new(flux_to_volts: Polynomial, volts_to_flux: Polynomial) -> Self {
        Self {
            flux_to_volts,
            volts_to_flux,
        }
    }

    /// Lamp voltage needed for an incident heat flux in kW/m2.
    #[inline]
    pub fn volts_for_flux(&self, flux_kw_m2: f64) -> f64 {
        self.flux_to_volts.eval(flux_kw_m2)
    }

    /// Incident heat flux in kW/m2 produced by a lamp voltage.
    #[inline]
    pub fn flux_for_volts(&self, volts: f64) -> f64 {
        self.volts_to_flux.eval(volts)
    }
}

impl TryFrom<fpa_config::LampCoefficients> for LampCalibration {
    type Error = FpaError;
    fn try_from(c: fpa_config::LampCoefficients) -> Result<Self, Self::Error> {
        Ok(Self::new(
            Polynomial::new(c.flux_to_volts)?,
            Polynomial::new(c.volts_to_flux)?,
        ))
    }
}

/// Voltage -> concentration fits for the gas analysis channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasCalibration {
    pub o2_percent: Polynomial,
    pub o2_inlet_percent: Polynomial,
    pub co_ppm: Polynomial,
    pub co2_ppm: Polynomial,
}

impl TryFrom<fpa_config::GasCoefficients> for GasCalibration {
    type Error = FpaError;
    fn try_from(c: fpa_config::GasCoefficients) -> Result<Self, Self::Error> {
        Ok(Self {
            o2_percent: Polynomial::linear(c.o2.0, c.o2.1)?,
            o2_inlet_percent: Polynomial::linear(c.o2_inlet.0, c.o2_inlet.1)?,
            co_ppm: Polynomial::linear(c.co.0, c.co.1)?,
            co2_ppm: Polynomial::linear(c.co2.0, c.co2.1)?,
        })
    }
}

/// Source of the most recent calibration artifacts.
pub trait CalibrationStore {
    fn load_latest(&self) -> Result<LampCalibration, FpaError>;

    /// Gas-analyzer fits; `Ok(None)` when the store does not carry them.
    fn load_latest_gas(&self) -> Result<Option<GasCalibration>, FpaError> {
        Ok(None)
    }
}

/// Calibration store backed by directories of CSV files; newest file wins.
#[derive(Debug, Clone)]
pub struct DirCalibrationStore {
    lamp_dir: PathBuf,
    gas_dir: Option<PathBuf>,
}

impl DirCalibrationStore {
    pub fn new(lamp_dir: impl Into<PathBuf>) -> Self {
        Self {
            lamp_dir: lamp_dir.into(),
            gas_dir: None,
        }
    }

    pub fn with_gas_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.gas_dir = Some(dir.into());
        self
    }

    fn latest(dir: &std::path::Path) -> Result<PathBuf, FpaError> {
        match fpa_config::latest_calibration_file(dir, "csv") {
            Ok(Some(p)) => Ok(p),
            Ok(None) => Err(FpaError::NoCalibrationFound(format!(
                "no .csv calibration in {}",
                dir.display()
            ))),
            Err(e) => Err(FpaError::NoCalibrationFound(e.to_string())),
        }
    }
}

impl CalibrationStore for DirCalibrationStore {
    fn load_latest(&self) -> Result<LampCalibration, FpaError> {
        let path = Self::latest(&self.lamp_dir)?;
        tracing::info!(path = %path.display(), "using lamp calibration");
        let coeffs = fpa_config::load_lamp_calibration_csv(&path)
            .map_err(|e| FpaError::Calibration(e.to_string()))?;
        LampCalibration::try_from(coeffs)
    }

    fn load_latest_gas(&self) -> Result<Option<GasCalibration>, FpaError> {
        let Some(dir) = &self.gas_dir else {
            return Ok(None);
        };
        let path = Self::latest(dir)?;
        tracing::info!(path = %path.display(), "using gas calibration");
        let coeffs = fpa_config::load_gas_calibration_csv(&path)
            .map_err(|e| FpaError::Calibration(e.to_string()))?;
        GasCalibration::try_from(coeffs).map(Some)
    }
}

/// In-memory calibration, handy for tests and for the simulator.
#[derive(Debug, Clone)]
pub struct StaticCalibration(pub LampCalibration);

impl CalibrationStore for StaticCalibration {
    fn load_latest(&self) -> Result<LampCalibration, FpaError> {
        Ok(self.0.clone())
    }
}
