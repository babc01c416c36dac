//! Fixed-window per-user rate limiting.
//!
//! Counters live in a sharded concurrent map. The entry API holds the shard
//! lock for the whole check-then-increment, so two concurrent requests from
//! the same user can never both take the last slot.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct WindowState {
    count: u32,
    last_reset: Instant,
}

/// Per-user request counter with reset-on-expiry.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    entries: DashMap<String, WindowState>,
}

impl RateLimiter {
    /// Allow `limit` requests per `window` for each user.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request for `user_id`; false means reject it.
    pub fn check_and_increment(&self, user_id: &str) -> bool {
        self.check_at(user_id, Instant::now())
    }

    /// [`check_and_increment`](Self::check_and_increment) at an explicit instant.
    pub fn check_at(&self, user_id: &str, now: Instant) -> bool {
        let mut entry = self
            .entries
            .entry(user_id.to_string())
            .or_insert(WindowState {
                count: 0,
                last_reset: now,
            });

        let state = entry.value_mut();
        if now.saturating_duration_since(state.last_reset) >= self.window {
            state.count = 0;
            state.last_reset = now;
        }

        if state.count >= self.limit {
            tracing::debug!("Rate limit reached for user {}", user_id);
            return false;
        }

        state.count += 1;
        true
    }

    /// Drop users whose window has elapsed. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, state| now.saturating_duration_since(state.last_reset) < self.window);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("Evicted {} expired rate-limit entries", removed);
        }
        removed
    }

    /// Number of users currently tracked.
    pub fn tracked_users(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_rejects_after_limit_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("U1", t0));
        }
        assert!(!limiter.check_at("U1", t0 + Duration::from_secs(59)));
        assert!(limiter.check_at("U2", t0));
    }

    #[test]
    fn test_resets_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("U1", t0));
        assert!(!limiter.check_at("U1", t0 + Duration::from_secs(30)));
        assert!(limiter.check_at("U1", t0 + Duration::from_secs(60)));
        assert!(!limiter.check_at("U1", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_rejection_does_not_extend_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(limiter.check_at("U1", t0));
        for s in 1..10 {
            assert!(!limiter.check_at("U1", t0 + Duration::from_secs(s)));
        }
        assert!(limiter.check_at("U1", t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_evict_expired() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check_at("old", t0);
        limiter.check_at("new", t0 + Duration::from_secs(30));
        assert_eq!(limiter.tracked_users(), 2);

        assert_eq!(limiter.evict_expired_at(t0 + Duration::from_secs(61)), 1);
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_concurrent_last_slot_accepts_exactly_one() {
        for _ in 0..50 {
            let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));
            for _ in 0..4 {
                assert!(limiter.check_and_increment("U1"));
            }

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let limiter = limiter.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        limiter.check_and_increment("U1")
                    })
                })
                .collect();

            let accepted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(accepted, 1);
        }
    }
}
