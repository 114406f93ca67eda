//! Retry policy for upstream reads
//!
//! The policy only decides; the fetcher performs the waits through a
//! [`Sleeper`](super::Sleeper). Rate-limit waits and failure retries are
//! budgeted separately.

use crate::config::FetchConfig;
use std::time::Duration;

/// Delay between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * factor^(n-1)` after the n-th failure
    Exponential { base: Duration, factor: u32 },
}

impl Backoff {
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, factor } => {
                let exp = failures.saturating_sub(1);
                base.saturating_mul(factor.saturating_pow(exp))
            },
        }
    }
}

/// What the fetcher should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Wait(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Requests that may fail (non-429) before the fetch is abandoned
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Wait after a 429 that carries no usable `Retry-After`
    pub rate_limit_fallback: Duration,
    /// 429s tolerated within one fetch before it is abandoned
    pub max_rate_limit_waits: u32,
    /// Upper bound on a single rate-limit wait, whatever `Retry-After` says
    pub max_rate_limit_wait: Duration,
    /// Pause after every completed fetch, successful or not
    pub throttle: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        let wait = Duration::from_millis(config.retry_wait_ms);
        Self {
            max_attempts: config.max_attempts,
            backoff: Backoff::Fixed(wait),
            rate_limit_fallback: wait,
            max_rate_limit_waits: config.max_rate_limit_waits,
            max_rate_limit_wait: Duration::from_secs(config.max_rate_limit_wait_secs),
            throttle: Duration::from_millis(config.throttle_ms),
        }
    }

    /// Zero delays everywhere; handy for tests against a local mock server
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(Duration::ZERO),
            rate_limit_fallback: Duration::ZERO,
            max_rate_limit_waits: 5,
            max_rate_limit_wait: Duration::ZERO,
            throttle: Duration::ZERO,
        }
    }

    /// Decide after the `failures`-th failed attempt
    pub fn after_failure(&self, failures: u32) -> Step {
        if failures >= self.max_attempts {
            Step::GiveUp
        } else {
            Step::Wait(self.backoff.delay(failures))
        }
    }

    /// Decide after a 429, given how many rate-limit waits already happened
    pub fn after_rate_limit(&self, waits_so_far: u32, hint: Option<Duration>) -> Step {
        if waits_so_far >= self.max_rate_limit_waits {
            Step::GiveUp
        } else {
            Step::Wait(hint.unwrap_or(self.rate_limit_fallback).min(self.max_rate_limit_wait))
        }
    }
}

/// Parse a `Retry-After` value: delta seconds (fractions allowed) or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
