//! Retry backoff policy.
//!
//! Exponential in the attempt number, capped, with bounded positive jitter.
//! The cap is applied after jitter so consecutive delays never decrease.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use canillita_core::defaults;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Jitter as a fraction of the computed delay, in `[0, 1)`.
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(defaults::BACKOFF_BASE_SECS),
            max: Duration::from_secs(defaults::BACKOFF_MAX_SECS),
            jitter_ratio: defaults::BACKOFF_JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            ..Self::default()
        }
    }

    /// Read `JOB_BACKOFF_BASE_SECS` and `JOB_BACKOFF_MAX_SECS`.
    pub fn from_env() -> Self {
        let base = std::env::var("JOB_BACKOFF_BASE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::BACKOFF_BASE_SECS);
        let max = std::env::var("JOB_BACKOFF_MAX_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::BACKOFF_MAX_SECS);
        Self::new(Duration::from_secs(base), Duration::from_secs(max))
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 0.99);
        self
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay(&self, attempt: i32) -> Duration {
        let exponent = attempt.max(1).saturating_sub(1).min(30) as u32;
        let factor = 2u32.saturating_pow(exponent);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay with a caller-supplied jitter sample in `[0, 1)`.
    pub fn delay_with_jitter(&self, attempt: i32, sample: f64) -> Duration {
        let delay = self.delay(attempt);
        let extra = delay.mul_f64(self.jitter_ratio * sample.clamp(0.0, 1.0));
        (delay + extra).min(self.max)
    }

    /// Delay with random jitter.
    pub fn next_delay(&self, attempt: i32) -> Duration {
        let sample = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with_jitter(attempt, sample)
    }

    /// When a job failing its `attempt`-th time becomes eligible again.
    pub fn next_eligible_at(&self, now: DateTime<Utc>, attempt: i32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.next_delay(attempt))
            .unwrap_or_else(|_| chrono::Duration::seconds(defaults::BACKOFF_MAX_SECS as i64));
        now + delay
    }
}
