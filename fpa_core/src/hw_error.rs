//! Maps `Box<dyn Error>` from trait boundaries to typed `FpaError`.
//!
//! The traits in `fpa_traits` use `Box<dyn Error + Send + Sync>` so any
//! instrument driver can plug in; this module converts those to our typed
//! error enum, with an optional feature-gated path for
//! `fpa_hardware::HwError` downcasting.

use crate::error::FpaError;

/// Direction of the failed hardware call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwSide {
    Sensor,
    Actuator,
}

/// Map a trait-boundary error to a typed `FpaError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static), side: HwSide) -> FpaError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<fpa_hardware::error::HwError>() {
            return match (hw, side) {
                (fpa_hardware::error::HwError::Timeout, HwSide::Sensor) => FpaError::Timeout,
                (other, HwSide::Sensor) => FpaError::SensorRead(other.to_string()),
                (other, HwSide::Actuator) => FpaError::ActuatorWrite(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    match side {
        HwSide::Sensor if s.to_lowercase().contains("timeout") => FpaError::Timeout,
        HwSide::Sensor => FpaError::SensorRead(s),
        HwSide::Actuator => FpaError::ActuatorWrite(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeout() {
        let e = std::io::Error::other("read Timeout on socket");
        assert_eq!(map_hw_error(&e, HwSide::Sensor), FpaError::Timeout);
    }

    #[test]
    fn actuator_side_is_always_actuator_write() {
        let e = std::io::Error::other("timeout");
        assert!(matches!(
            map_hw_error(&e, HwSide::Actuator),
            FpaError::ActuatorWrite(_)
        ));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_hw_error() {
        let e = fpa_hardware::error::HwError::Disconnected;
        assert!(matches!(
            map_hw_error(&e, HwSide::Sensor),
            FpaError::SensorRead(_)
        ));
        let t = fpa_hardware::error::HwError::Timeout;
        assert_eq!(map_hw_error(&t, HwSide::Sensor), FpaError::Timeout);
    }
}
