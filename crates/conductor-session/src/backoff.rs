//! Capped exponential backoff with full jitter.
//!
//! The ceiling for the n-th consecutive failure is `min(base * 2^n, cap)` and
//! the actual delay is drawn uniformly from `[0, ceiling)`.

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_BASE: Duration = Duration::from_millis(100);
pub const DEFAULT_CAP: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            failures: 0,
        }
    }

    /// Consecutive failed connects since the last successful open
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Upper bound (exclusive) of the next delay
    pub fn ceiling(&self) -> Duration {
        ceiling_for(self.base, self.cap, self.failures)
    }

    /// Draw the delay for the current failure count, then count the failure.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let delay = full_jitter(self.ceiling(), rng);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

pub fn ceiling_for(base: Duration, cap: Duration, failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |ceiling| ceiling.min(cap))
}

fn full_jitter<R: Rng + ?Sized>(ceiling: Duration, rng: &mut R) -> Duration {
    let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(0..ceiling_ms))
}
