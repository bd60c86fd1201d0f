//! Restart-safe exponential backoff.
//!
//! Delays are derived from the wall-clock age of the resource (time since
//! creation, or since the deletion request once one exists), not from an
//! in-memory retry counter, so a process restart continues the schedule
//! instead of resetting it.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// First retry delay.
    pub initial: Duration,
    /// Upper bound for the doubling schedule.
    pub max: Duration,
    /// Fixed retry interval when no resource object is available to derive
    /// an age from.
    pub no_resource_retry: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(15 * 60),
            no_resource_retry: Duration::from_secs(30),
        }
    }
}

impl BackoffConfig {
    /// Delay for a resource of the given age: the schedule doubles from
    /// `initial`, and the age tells us how many delays have already been
    /// consumed (sum of prior delays ≤ age).
    pub fn delay_for_age(&self, age: Duration) -> Duration {
        let mut delay = self.initial;
        let mut consumed = Duration::ZERO;
        while consumed + delay <= age && delay < self.max {
            consumed += delay;
            delay = (delay * 2).min(self.max);
        }
        delay
    }
}
