//! Retry policy for upstream requests.
//!
//! The policy is a pure step function: given the zero-indexed retry attempt
//! and the failure, it either yields a delay in milliseconds or gives up.
//! The transport loop in [`crate::client`] drives it; nothing here sleeps
//! or performs I/O, so the whole policy is unit-testable with a fixed RNG.

use chrono::{DateTime, Utc};

use crate::error::ArenaError;

/// Retry budget and backoff base, taken from [`crate::config::ApiConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_ms: u64,
}

/// One step of the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this many milliseconds, then reissue the request.
    RetryAfterMs(u64),
    /// Budget exhausted or error not retryable; surface it.
    Fail,
}

impl RetryPolicy {
    /// Decides what to do about a failure on retry `attempt` (zero-indexed
    /// at the first retry). `random` supplies jitter in `[0, 1)`.
    pub fn next_action(
        &self,
        attempt: u32,
        err: &ArenaError,
        random: impl FnOnce() -> f64,
    ) -> RetryDecision {
        if !err.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::Fail;
        }
        RetryDecision::RetryAfterMs(compute_retry_delay_ms(
            attempt,
            self.base_ms,
            err.retry_after(),
            random,
        ))
    }
}

/// Computes the backoff delay for one retry.
///
/// An upstream `Retry-After` hint is authoritative: the delay is exactly
/// `ceil(seconds × 1000)` ms with no jitter. Otherwise the delay is
/// exponential with additive jitter bounded by one base unit:
/// `base × 2^attempt + floor(random × base)`.
pub fn compute_retry_delay_ms(
    attempt: u32,
    base_ms: u64,
    retry_after_secs: Option<f64>,
    random: impl FnOnce() -> f64,
) -> u64 {
    if let Some(secs) = retry_after_secs {
        return (secs.max(0.0) * 1000.0).ceil() as u64;
    }
    let backoff = base_ms.saturating_mul(1u64 << attempt.min(32));
    let jitter = (random() * base_ms as f64).floor() as u64;
    backoff + jitter
}

/// Parses a `Retry-After` header value into seconds.
///
/// Numeric values are taken as-is; HTTP-date values become the remaining
/// delta from `now`, floored at zero so a stale date never yields a
/// negative delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<f64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return Some(secs.max(0.0));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some((delta.num_milliseconds() as f64 / 1000.0).max(0.0))
}
