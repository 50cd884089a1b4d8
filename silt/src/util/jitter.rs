use rand::Rng;
use std::time::Duration;

/// Upper bound for the post-flush-signal consumer sleep.
pub const DEFAULT_JITTER_MS: u64 = 500;

/// Returns a uniformly random duration in `[0, max_ms]`.
///
/// Consumers sleep this long after signalling a size-based flush so the flush
/// task can win the buffer lock instead of being starved by a hot topic.
pub fn jitter(max_ms: u64) -> Duration {
    let ms = rand::thread_rng().gen_range(0..=max_ms);
    Duration::from_millis(ms)
}
