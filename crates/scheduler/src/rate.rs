//! Per-host token bucket. Generalizes the politeness-delay tracking pattern
//! (a `DashMap<host, last_seen>` gate) into a bucket that can be asked for
//! the wait remaining, not just a yes/no.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub struct HostRateLimiter {
    last_seen: DashMap<String, Instant>,
    min_delay: Duration,
}

impl HostRateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self { last_seen: DashMap::new(), min_delay }
    }

    /// Atomically checks and, if the host is free, records a visit in one
    /// shard-locked operation — `DashMap::entry` holds the lock for the
    /// whole call, so two callers racing the same host can't both observe
    /// "free" before either records. Returns `None` if the visit may
    /// proceed now (and has been recorded); `Some(wait)` with the remaining
    /// delay if another visit is already within `min_delay`.
    pub fn try_acquire(&self, host: &str) -> Option<Duration> {
        let now = Instant::now();
        match self.last_seen.entry(host.to_string()) {
            Entry::Occupied(mut e) => {
                let elapsed = now.duration_since(*e.get());
                if elapsed >= self.min_delay {
                    e.insert(now);
                    None
                } else {
                    Some(self.min_delay - elapsed)
                }
            }
            Entry::Vacant(e) => {
                e.insert(now);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_visit_is_never_throttled() {
        let limiter = HostRateLimiter::new(Duration::from_secs(2));
        assert_eq!(limiter.try_acquire("example.onion"), None);
    }

    #[test]
    fn immediate_revisit_is_throttled() {
        let limiter = HostRateLimiter::new(Duration::from_secs(2));
        assert_eq!(limiter.try_acquire("example.onion"), None);
        assert!(limiter.try_acquire("example.onion").is_some());
    }
}
