//! Fixed-phase periodic trigger

use crate::ConfigError;
use std::time::Duration;

/// Fires once after `initial_delay`, then every `period`.
///
/// Fire times are anchored to the first one (`first + k * period`), so a
/// late poll does not shift later fires. When several periods have been
/// missed the scheduler fires once and skips to the next future slot.
#[derive(Debug, Clone)]
pub struct PeriodicScheduler {
    period: Duration,
    first: Duration,
    next_fire: Duration,
    /// Index of the slot `next_fire` belongs to
    slot: u128,
    fired: u64,
}

impl PeriodicScheduler {
    pub fn new(start: Duration, initial_delay: Duration, period: Duration) -> Result<Self, ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::InvalidSchedule("period must be positive".to_string()));
        }
        let first = start + initial_delay;
        Ok(Self {
            period,
            first,
            next_fire: first,
            slot: 0,
            fired: 0,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time of the next fire on the monotonic clock
    pub fn next_fire(&self) -> Duration {
        self.next_fire
    }

    /// Number of times [`poll`](Self::poll) returned `true`
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    /// Returns `true` if the scheduler is due at `now`; at most once per call.
    pub fn poll(&mut self, now: Duration) -> bool {
        if now < self.next_fire {
            return false;
        }

        let elapsed = (now - self.first).as_nanos();
        let k = elapsed / self.period.as_nanos() + 1;
        let skipped = k.saturating_sub(self.slot + 1);
        if skipped > 0 {
            tracing::debug!("Scheduler skipped {} missed period(s)", skipped);
        }

        self.slot = k;
        self.next_fire = self.first + mul_duration(self.period, k);
        self.fired += 1;
        true
    }
}

fn mul_duration(d: Duration, k: u128) -> Duration {
    let nanos = d.as_nanos().saturating_mul(k);
    let secs = (nanos / 1_000_000_000).min(u64::MAX as u128) as u64;
    Duration::new(secs, (nanos % 1_000_000_000) as u32)
}
