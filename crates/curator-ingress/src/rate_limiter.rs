//! Per-client throttling of conversion submissions.
//!
//! Sliding window: a key may make at most `max_per_window` calls within any
//! `window_ms` span. Keys are opaque; intake uses `conversion:<ip>`.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use async_trait::async_trait;
use curator_types::{LedgerError, RateLimitConfig, Result};
use parking_lot::Mutex;

/// Throttle port. A shared backend (e.g. a remote counter) can stand in for
/// the in-memory limiter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record one call for `key`; `false` means the caller must be refused.
    async fn check_and_consume(&self, key: &str) -> bool;
}

#[derive(Default)]
struct Windows {
    /// `key → timestamps (ms since start) of recent calls`, oldest first.
    by_key: HashMap<String, VecDeque<u64>>,
    last_sweep_ms: u64,
}

impl Windows {
    fn sweep(&mut self, now_ms: u64, window_ms: u64) {
        self.by_key
            .retain(|_, w| w.back().is_some_and(|&t| now_ms.saturating_sub(t) < window_ms));
        self.last_sweep_ms = now_ms;
    }
}

/// In-process sliding-window limiter.
///
/// Idle keys are swept at most once per window, so the map holds only keys
/// seen within roughly the last two windows.
pub struct MemoryRateLimiter {
    windows: Mutex<Windows>,
    window_ms: u64,
    max_per_window: usize,
    started: Instant,
}

impl MemoryRateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(Windows::default()),
            window_ms: config.window_ms,
            max_per_window: config.max_per_window,
            started: Instant::now(),
        }
    }

    /// Check and record a call at an explicit timestamp.
    ///
    /// # Errors
    /// [`LedgerError::RateLimited`] when the window is full. The refused call
    /// is not recorded.
    pub fn check_and_record(&self, key: &str, now_ms: u64) -> Result<()> {
        let mut windows = self.windows.lock();
        if now_ms.saturating_sub(windows.last_sweep_ms) >= self.window_ms {
            windows.sweep(now_ms, self.window_ms);
        }
        let window = windows.by_key.entry(key.to_owned()).or_default();

        while window
            .front()
            .is_some_and(|&t| now_ms.saturating_sub(t) >= self.window_ms)
        {
            window.pop_front();
        }

        if window.len() >= self.max_per_window {
            return Err(LedgerError::RateLimited {
                key: key.to_owned(),
            });
        }
        window.push_back(now_ms);
        Ok(())
    }

    /// Drop keys with no calls inside the current window.
    pub fn prune(&self, now_ms: u64) {
        self.windows.lock().sweep(now_ms, self.window_ms);
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().by_key.len()
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check_and_consume(&self, key: &str) -> bool {
        match self.check_and_record(key, self.now_ms()) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(key, "rate limited");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_ms: u64, max_per_window: usize) -> MemoryRateLimiter {
        MemoryRateLimiter::new(&RateLimitConfig {
            window_ms,
            max_per_window,
        })
    }

    #[test]
    fn allows_up_to_limit() {
        let l = limiter(1000, 5);
        for i in 0..5 {
            assert!(l.check_and_record("conversion:1.2.3.4", 100 + i).is_ok());
        }
    }

    #[test]
    fn blocks_when_window_full() {
        let l = limiter(1000, 3);
        l.check_and_record("k", 100).unwrap();
        l.check_and_record("k", 200).unwrap();
        l.check_and_record("k", 300).unwrap();
        assert!(matches!(
            l.check_and_record("k", 400),
            Err(LedgerError::RateLimited { .. })
        ));
    }

    #[test]
    fn window_slides() {
        let l = limiter(1000, 3);
        l.check_and_record("k", 100).unwrap();
        l.check_and_record("k", 200).unwrap();
        l.check_and_record("k", 300).unwrap();
        // At 1250 the first two calls have left the window.
        assert!(l.check_and_record("k", 1250).is_ok());
        assert!(l.check_and_record("k", 1260).is_ok());
        assert!(l.check_and_record("k", 1270).is_err());
    }

    #[test]
    fn keys_are_independent() {
        let l = limiter(1000, 1);
        l.check_and_record("conversion:a", 10).unwrap();
        assert!(l.check_and_record("conversion:b", 10).is_ok());
        assert!(l.check_and_record("conversion:a", 20).is_err());
    }

    #[test]
    fn prune_forgets_idle_keys() {
        let l = limiter(1000, 1);
        l.check_and_record("k", 10).unwrap();
        l.prune(5_000);
        assert_eq!(l.tracked_keys(), 0);
    }

    #[test]
    fn idle_keys_are_swept_on_later_calls() {
        let l = limiter(1, 10);
        for i in 0..5_000 {
            l.check_and_record(&format!("conversion:10.0.{}.{}", i / 256, i % 256), 0)
                .unwrap();
        }
        assert_eq!(l.tracked_keys(), 5_000);

        l.check_and_record("conversion:192.0.2.1", 20).unwrap();
        assert_eq!(l.tracked_keys(), 1);
    }

    #[test]
    fn sweep_keeps_keys_inside_the_window() {
        let l = limiter(1000, 10);
        l.check_and_record("old", 0).unwrap();
        l.check_and_record("recent", 900).unwrap();
        l.check_and_record("now", 1500).unwrap();
        assert_eq!(l.tracked_keys(), 2);
        // The recent key's allowance survived the sweep.
        assert!(l.check_and_record("recent", 1600).is_ok());
    }

    #[tokio::test]
    async fn trait_refuses_after_allowance() {
        let l = limiter(60_000, 2);
        assert!(l.check_and_consume("conversion:ip").await);
        assert!(l.check_and_consume("conversion:ip").await);
        assert!(!l.check_and_consume("conversion:ip").await);
    }
}
