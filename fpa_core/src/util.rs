//! Common time/period helpers for fpa_core.

use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Polling period as a `Duration`.
/// - Clamps `period_ms` to at least 1 so the loop never spins without pacing.
#[inline]
pub fn period(period_ms: u64) -> Duration {
    Duration::from_millis(period_ms.max(1))
}

/// Nominal sampling rate in Hz for a polling period.
#[inline]
pub fn rate_hz(period_ms: u64) -> f64 {
    MILLIS_PER_SEC as f64 / period_ms.max(1) as f64
}

/// Number of cycles the pre-test baseline spans at the nominal rate (rounded up).
#[inline]
pub fn pretest_cycles(pretest_s: f64, period_ms: u64) -> u64 {
    if !pretest_s.is_finite() || pretest_s <= 0.0 {
        return 0;
    }
    (pretest_s * rate_hz(period_ms)).ceil() as u64
}
