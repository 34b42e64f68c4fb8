//! Backoff policy for rate-limited completion calls.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Backoff delay before retry `attempt` (0-based), without jitter.
///
/// `min(base * 2^attempt, cap)`. Saturates instead of overflowing, so large
/// attempt numbers plateau at the cap.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    config
        .backoff_base
        .checked_mul(factor)
        .unwrap_or(Duration::MAX)
        .min(config.backoff_cap)
}

/// Backoff delay plus uniform jitter in `[0, backoff_jitter]`.
pub fn jittered_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    backoff_delay(config, attempt) + jitter(config.backoff_jitter)
}

/// Jittered backoff, raised to the server's `Retry-After` hint when it asks
/// for longer. The hint is clamped to `backoff_cap`.
pub fn backoff_after_rate_limit(
    config: &RetryConfig,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    let delay = jittered_backoff(config, attempt);
    match retry_after {
        Some(hint) => delay.max(hint.min(config.backoff_cap)),
        None => delay,
    }
}

/// Delay imposed before every classification call to stay under a shared
/// rate limit.
pub fn pacing_delay(config: &RetryConfig) -> Duration {
    config.pacing_base + jitter(config.pacing_jitter)
}

/// Uniform random duration in `[0, max]`.
fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(millis)
}
