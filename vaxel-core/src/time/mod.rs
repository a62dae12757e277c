//! ## vaxel-core::time
//! **Scheduler clocks**
//!
//! The bus reads time through [`Clock`] so that tests can drive timed
//! delivery with a [`VirtualClock`] instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time since an arbitrary epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall clock anchored at construction.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    offset: Arc<AtomicU64>, // Nanoseconds
}

impl VirtualClock {
    pub fn new(seed_ns: u64) -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(seed_ns)),
        }
    }

    pub fn now_ns(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn advance(&self, ns: u64) {
        self.offset.fetch_add(ns, Ordering::Release);
    }

    pub fn advance_by(&self, step: Duration) {
        self.advance(u64::try_from(step.as_nanos()).unwrap_or(u64::MAX));
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_clones_share_time() {
        let clock = VirtualClock::new(5);
        let view = clock.clone();
        clock.advance_by(Duration::from_millis(2));
        assert_eq!(view.now_ns(), 2_000_005);
        assert_eq!(view.now(), Duration::from_nanos(2_000_005));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
