//! Human-readable error descriptions and structured JSON error formatting.

use crate::sink::OutputError;

/// Stable process exit codes.
pub mod exit {
    pub const GENERIC: i32 = 1;
    pub const NO_CALIBRATION: i32 = 2;
    pub const ACTUATOR: i32 = 3;
    pub const CONFIG: i32 = 4;
    pub const OUTPUT_EXISTS: i32 = 5;
}

fn find_fpa_error(err: &eyre::Report) -> Option<&fpa_core::FpaError> {
    err.chain()
        .find_map(|e| e.downcast_ref::<fpa_core::FpaError>())
}

/// Short machine-readable name of the failure class.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    use fpa_core::FpaError;

    if err.downcast_ref::<fpa_core::BuildError>().is_some() {
        return "Config";
    }
    if let Some(OutputError::Exists(_)) = err.downcast_ref::<OutputError>() {
        return "OutputExists";
    }
    match find_fpa_error(err) {
        Some(FpaError::NoCalibrationFound(_)) => "NoCalibration",
        Some(FpaError::Calibration(_)) => "Calibration",
        Some(FpaError::ActuatorWrite(_)) => "ActuatorFault",
        Some(FpaError::Config(_)) => "Config",
        _ => "Error",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use fpa_core::{BuildError, FpaError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid experiment parameters ({msg}).\nLikely causes: Out-of-range setpoint or values in the TOML.\nHow to fix: Check the setpoint and the config file, then rerun."
            ),
            other => format!(
                "What happened: The experiment could not be assembled ({other}).\nLikely causes: An instrument failed to initialize.\nHow to fix: Re-run `fpa self-check` and inspect the logs."
            ),
        };
    }

    if let Some(OutputError::Exists(path)) = err.downcast_ref::<OutputError>() {
        return format!(
            "What happened: Output folder {} already exists.\nLikely causes: This test number was already run with the same material and setpoint.\nHow to fix: Pick a new --test-id or move the old folder away; existing data is never overwritten.",
            path.display()
        );
    }

    if let Some(fe) = find_fpa_error(err) {
        return match fe {
            FpaError::NoCalibrationFound(detail) => format!(
                "What happened: No calibration file was found ({detail}).\nLikely causes: The daily lamp calibration has not been run, or [calibration] points at the wrong directory.\nHow to fix: Run the lamp calibration, or fix calibration.lamp_dir in the config."
            ),
            FpaError::Calibration(detail) => format!(
                "What happened: The calibration file could not be used ({detail}).\nLikely causes: Wrong headers or non-numeric coefficients.\nHow to fix: Expected headers 'coefficients_heatflux_to_voltage,coefficients_voltage_to_heatflux'."
            ),
            FpaError::ActuatorWrite(detail) => format!(
                "What happened: The lamp supply rejected a command ({detail}).\nLikely causes: Supply disconnected or commanded outside its range.\nHow to fix: Check the supply connection and the [lamps] voltage bounds. The lamps were driven to zero."
            ),
            FpaError::Config(detail) => format!(
                "What happened: Invalid configuration ({detail}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit code for a failed command.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match reason_name(err) {
        "NoCalibration" => exit::NO_CALIBRATION,
        "ActuatorFault" => exit::ACTUATOR,
        "Config" => exit::CONFIG,
        "OutputExists" => exit::OUTPUT_EXISTS,
        _ => exit::GENERIC,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use fpa_core::FpaError;

    #[test]
    fn wrapped_actuator_fault_maps_to_its_code() {
        let err = Err::<(), _>(FpaError::ActuatorWrite("supply offline".into()))
            .wrap_err("cycle 3 at t = 0.3 s")
            .unwrap_err();
        assert_eq!(exit_code_for_error(&err), exit::ACTUATOR);
        assert!(humanize(&err).contains("supply offline"));
    }

    #[test]
    fn missing_calibration_maps_to_its_code() {
        let err = eyre::Report::new(FpaError::NoCalibrationFound("empty dir".into()));
        assert_eq!(exit_code_for_error(&err), exit::NO_CALIBRATION);
    }

    #[test]
    fn unknown_errors_are_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), exit::GENERIC);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
        assert_eq!(v["exit_code"], 1);
    }
}
