use rand::Rng;
use std::time::Duration;

use crate::config::BatchConfig;

/// Delay before retry number `retry` (1-based).
///
/// A server-supplied `Retry-After` is honoured, capped at `backoff_max_ms`,
/// with +/-10% jitter. Otherwise exponential backoff from `backoff_base_ms`,
/// capped at `backoff_max_ms`, with full jitter.
pub fn backoff_delay(cfg: &BatchConfig, retry: u32, retry_after: Option<Duration>) -> Duration {
    let max = Duration::from_millis(cfg.backoff_max_ms);
    match retry_after {
        Some(retry_after) => {
            let base_ms = retry_after.min(max).as_millis() as u64;
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            Duration::from_millis(((base_ms as f64) * jitter_factor).round() as u64)
        }
        None => {
            let ceiling = exponential_ceiling(cfg, retry);
            let jittered_ms = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
            Duration::from_millis(jittered_ms)
        }
    }
}

/// Un-jittered upper bound for retry number `retry`.
pub fn exponential_ceiling(cfg: &BatchConfig, retry: u32) -> Duration {
    let shift = retry.saturating_sub(1).min(20);
    let ms = cfg.backoff_base_ms.saturating_mul(1u64 << shift);
    Duration::from_millis(ms.min(cfg.backoff_max_ms))
}
