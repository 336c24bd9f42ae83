use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for the control loop and the simulated rig.
///
/// - now(): returns a monotonic Instant
/// - sleep(): coarse blocking wait (pre-test idle only)
/// - wait_until(): tight wait used between polling cycles
/// - secs_since(): elapsed seconds from an epoch Instant as f64
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Busy-poll until `deadline` has passed.
    ///
    /// The control loop never blocks inside a cycle; it spins on `now()`
    /// between cycles so the next one starts as soon as the period elapses.
    fn wait_until(&self, deadline: Instant) {
        while self.now() < deadline {
            std::hint::spin_loop();
        }
    }

    /// Seconds elapsed since `epoch`, saturating at 0 on underflow.
    fn secs_since(&self, epoch: Instant) -> f64 {
        self.now().saturating_duration_since(epoch).as_secs_f64()
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
    fn wait_until(&self, deadline: Instant) {
        (**self).wait_until(deadline)
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// now() = origin + offset
/// sleep(d) and wait_until(t) advance the offset without blocking, so a
/// whole experiment can be replayed in microseconds of wall time. Clones
/// share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    /// Set the absolute offset relative to origin.
    pub fn set_offset(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = d;
        }
    }

    /// Current offset from origin.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn wait_until(&self, deadline: Instant) {
        let target = deadline.saturating_duration_since(self.origin);
        if let Ok(mut off) = self.offset.lock()
            && *off < target
        {
            *off = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_wait_jumps_forward_only() {
        let clk = ManualClock::new();
        let t0 = clk.now();
        clk.wait_until(t0 + Duration::from_millis(100));
        assert_eq!(clk.ms_since(t0), 100);
        // A deadline in the past leaves time untouched.
        clk.wait_until(t0 + Duration::from_millis(50));
        assert_eq!(clk.ms_since(t0), 100);
    }

    #[test]
    fn clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        let t0 = a.now();
        b.sleep(Duration::from_millis(250));
        assert!((a.secs_since(t0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn monotonic_wait_until_returns_after_deadline() {
        let clk = MonotonicClock::new();
        let deadline = clk.now() + Duration::from_millis(2);
        clk.wait_until(deadline);
        assert!(clk.now() >= deadline);
    }
}
