use rand::Rng;
use std::time::Duration;

/// Highest exponent applied to the base delay.
const MAX_EXPONENT: u32 = 16;

/// Exponential delay for the given retry count: `base * 2^retry_count`,
/// capped at `max`.
pub fn exponential_delay(base: Duration, max: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.pow(retry_count.min(MAX_EXPONENT));
    base.saturating_mul(factor).min(max)
}

/// [`exponential_delay`] with jitter: the result lies between half the
/// exponential delay and the full delay.
pub fn backoff_delay(base: Duration, max: Duration, retry_count: u32) -> Duration {
    let delay = exponential_delay(base, max, retry_count);
    let half = delay / 2;
    let spread = u64::try_from((delay - half).as_millis()).unwrap_or(u64::MAX);
    if spread == 0 {
        return delay;
    }
    half + Duration::from_millis(rand::rng().random_range(0..=spread))
}
