// Bounded, time-expiring cache of remote verdicts keyed by normalized text.
//
// Only successful outcomes are cached. Repeated submissions of the same
// text inside the TTL skip the network round-trip and the rate limiter.

use std::time::Duration;

use moka::future::Cache;

use super::traits::SignalOutcome;

pub type VerdictCache = Cache<String, SignalOutcome>;

/// Build a cache holding at most `capacity` outcomes for `ttl` each.
pub fn verdict_cache(ttl: Duration, capacity: usize) -> VerdictCache {
    Cache::builder()
        .max_capacity(capacity.max(1) as u64)
        .time_to_live(ttl)
        .build()
}
