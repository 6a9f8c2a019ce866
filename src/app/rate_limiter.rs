//! Per-phone sliding-window throttle for OTP requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::domain::OtpError;

/// Thread-safe sliding-window limiter keyed by normalized phone number.
///
/// Each key's window is checked and updated while its `DashMap` entry is
/// held, so concurrent requests for one number serialize on that entry.
/// Idle keys are pruned at most once per window from the request path, and
/// additionally by the challenge reaper when it runs.
#[derive(Debug)]
pub struct OtpRequestLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    max_requests: u32,
    window: chrono::Duration,
    last_prune_ms: AtomicI64,
}

impl OtpRequestLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: chrono::Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            last_prune_ms: AtomicI64::new(0),
        }
    }

    /// Admit and count a request, or fail with a retry-after hint
    pub fn check_and_record(&self, key: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let result = self.record(key, now);
        // The entry guard is released by now; `retain` would deadlock on it
        self.maybe_prune(now);
        result
    }

    fn record(&self, key: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let mut entry = self.windows.entry(key.to_string()).or_default();
        let cutoff = now - self.window;
        while entry.front().is_some_and(|at| *at <= cutoff) {
            entry.pop_front();
        }

        if entry.len() >= self.max_requests as usize {
            let retry_after_secs = entry
                .front()
                .map(|oldest| (*oldest + self.window - now).num_seconds().max(1) as u64)
                .unwrap_or(1);
            return Err(OtpError::RateLimitExceeded { retry_after_secs });
        }

        entry.push_back(now);
        Ok(())
    }

    fn maybe_prune(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_prune_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < self.window.num_milliseconds() {
            return;
        }
        // One caller per window wins the swap and does the sweep
        if self
            .last_prune_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.prune(now);
        }
    }

    /// Drop windows whose requests have all aged out. Returns the number removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let before = self.windows.len();
        self.windows.retain(|_, requests| {
            while requests.front().is_some_and(|at| *at <= cutoff) {
                requests.pop_front();
            }
            !requests.is_empty()
        });
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Pruned idle OTP rate-limit windows");
        }
        removed
    }

    /// Number of keys currently tracked
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_allows_up_to_limit_then_rejects() {
        let limiter = OtpRequestLimiter::new(3, Duration::minutes(10));
        let now = Utc::now();

        for i in 0..3 {
            assert!(limiter.check_and_record("+15550100", now + Duration::seconds(i)).is_ok());
        }

        let err = limiter
            .check_and_record("+15550100", now + Duration::seconds(3))
            .unwrap_err();
        match err {
            OtpError::RateLimitExceeded { retry_after_secs } => {
                assert_eq!(retry_after_secs, 597);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_window_slides() {
        let limiter = OtpRequestLimiter::new(2, Duration::minutes(1));
        let start = Utc::now();

        assert!(limiter.check_and_record("k", start).is_ok());
        assert!(limiter.check_and_record("k", start + Duration::seconds(30)).is_ok());
        assert!(limiter.check_and_record("k", start + Duration::seconds(59)).is_err());
        // The first request has aged out
        assert!(limiter.check_and_record("k", start + Duration::seconds(61)).is_ok());
    }

    #[test]
    fn test_rejected_requests_are_not_counted() {
        let limiter = OtpRequestLimiter::new(1, Duration::minutes(1));
        let start = Utc::now();

        assert!(limiter.check_and_record("k", start).is_ok());
        for i in 1..10 {
            assert!(limiter.check_and_record("k", start + Duration::seconds(i)).is_err());
        }
        assert!(limiter.check_and_record("k", start + Duration::seconds(61)).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = OtpRequestLimiter::new(1, Duration::minutes(1));
        let now = Utc::now();

        assert!(limiter.check_and_record("+15550100", now).is_ok());
        assert!(limiter.check_and_record("+15550101", now).is_ok());
        assert!(limiter.check_and_record("+15550100", now).is_err());
    }

    #[test]
    fn test_prune_removes_idle_windows() {
        let limiter = OtpRequestLimiter::new(5, Duration::minutes(1));
        let now = Utc::now();

        limiter.check_and_record("old", now).unwrap();
        limiter.check_and_record("fresh", now + Duration::seconds(50)).unwrap();
        assert_eq!(limiter.len(), 2);

        assert_eq!(limiter.prune(now + Duration::seconds(70)), 1);
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.is_empty());
    }

    #[test]
    fn test_requests_prune_idle_windows_without_reaper() {
        let limiter = OtpRequestLimiter::new(5, Duration::minutes(1));
        let now = Utc::now();

        for i in 0..100 {
            limiter
                .check_and_record(&format!("+1555{i:07}"), now + Duration::seconds(1))
                .unwrap();
        }
        assert_eq!(limiter.len(), 100);

        // Within the same window nothing is swept
        limiter
            .check_and_record("+15559999999", now + Duration::seconds(30))
            .unwrap();
        assert_eq!(limiter.len(), 101);

        limiter
            .check_and_record("+15558888888", now + Duration::minutes(3))
            .unwrap();
        assert_eq!(limiter.len(), 1);
    }
}
