use std::time::Duration;

use rand::Rng;

/// Classification for retry policy.
///
/// Used to determine how a failed `extract` attempt should be handled.
///
/// # Behavior Summary
///
/// | Class | Retry Same Provider? | Eligible for Fallback? |
/// |-------|----------------------|------------------------|
/// | `Never` | No | No |
/// | `WithBackoff` | Yes, with exponential backoff | Yes, once attempts are exhausted |
/// | `NextProvider` | No | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad input, schema defect, or terminal failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry the same provider with exponential backoff plus jitter.
    ///
    /// Used for transient remote errors like rate limiting (429) or
    /// transport failures. Attempts are capped by [`RetryPolicy`].
    WithBackoff,

    /// Don't retry this provider, but another provider might succeed.
    ///
    /// Used for auth and not-found failures: repeating the same call
    /// against the same source cannot change the outcome.
    NextProvider,
}

/// Bounded exponential backoff policy for `extract` retries.
///
/// Retries only ever apply to the extract stage; `transform_query` is
/// never re-invoked for a retried attempt.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of extract attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry. Doubles on each subsequent retry.
    pub base_delay: Duration,

    /// Upper bound on any single retry delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Compute the delay before retrying after `failed_attempts` failures.
    ///
    /// Full jitter: the delay is drawn uniformly from zero up to the capped
    /// exponential bound, so concurrent fetches against the same provider
    /// do not retry in lockstep.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let bound = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        let bound_ms = bound.as_millis() as u64;
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=bound_ms))
    }
}
