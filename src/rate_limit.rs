//! Per-client fixed-window admission control.
//!
//! Records live in process memory only and are never persisted or shared
//! across processes. Expired records are reset on the client's next request;
//! records of clients that never return stay in the map.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, time::Duration};

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow { remaining: u32 },
    Deny { retry_after: Duration, limit: u32 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Counter store consulted before any request work happens.
pub trait RateLimitStore: Send + Sync {
    fn check(&self, client_id: &str, now: DateTime<Utc>) -> Decision;
}

#[derive(Debug)]
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: TimeDelta,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl InMemoryRateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            max_requests: cfg.max_requests,
            window: cfg.window(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, client_id: &str) -> Option<RateLimitRecord> {
        self.records.lock().get(client_id).copied()
    }

    pub fn tracked_clients(&self) -> usize {
        self.records.lock().len()
    }
}

impl RateLimitStore for InMemoryRateLimiter {
    fn check(&self, client_id: &str, now: DateTime<Utc>) -> Decision {
        // Read, reset-or-increment and compare under one lock so concurrent
        // requests from the same client cannot lose updates.
        let mut records = self.records.lock();
        let record = records
            .entry(client_id.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                window_start: now,
            });

        let window_end = record.window_start + self.window;
        if record.count == 0 || now > window_end {
            *record = RateLimitRecord {
                count: 1,
                window_start: now,
            };
            return Decision::Allow {
                remaining: self.max_requests.saturating_sub(1),
            };
        }

        record.count = record.count.saturating_add(1);
        if record.count > self.max_requests {
            let retry_after = (window_end - now).to_std().unwrap_or(Duration::ZERO);
            Decision::Deny {
                retry_after,
                limit: self.max_requests,
            }
        } else {
            Decision::Allow {
                remaining: self.max_requests - record.count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn limiter(max_requests: u32, window_secs: u64) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(&RateLimitConfig {
            max_requests,
            window_secs,
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 19, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_allows_exactly_n_then_denies() {
        let rl = limiter(100, 3600);
        for i in 0..100 {
            let now = t0() + chrono::Duration::seconds(i);
            assert!(rl.check("10.0.0.1", now).is_allowed(), "request {} denied", i + 1);
        }
        let now = t0() + chrono::Duration::seconds(600);
        match rl.check("10.0.0.1", now) {
            Decision::Deny { retry_after, limit } => {
                assert_eq!(limit, 100);
                assert_eq!(retry_after, Duration::from_secs(3000));
            }
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[test]
    fn test_window_elapse_starts_fresh_count() {
        let rl = limiter(2, 60);
        assert!(rl.check("c", t0()).is_allowed());
        assert!(rl.check("c", t0()).is_allowed());
        assert!(!rl.check("c", t0()).is_allowed());

        // Exactly at the window end the old window still applies.
        assert!(!rl.check("c", t0() + chrono::Duration::seconds(60)).is_allowed());

        let later = t0() + chrono::Duration::seconds(61);
        assert_eq!(rl.check("c", later), Decision::Allow { remaining: 1 });
        assert_eq!(
            rl.record("c"),
            Some(RateLimitRecord {
                count: 1,
                window_start: later
            })
        );
    }

    #[test]
    fn test_oversized_window_keeps_limiting() {
        let rl = limiter(2, u64::MAX);
        assert!(rl.check("c", t0()).is_allowed());
        assert!(rl.check("c", t0()).is_allowed());
        assert!(!rl.check("c", t0()).is_allowed());
        assert!(!rl.check("c", t0() + chrono::Duration::days(30)).is_allowed());
    }

    #[test]
    fn test_clients_are_independent() {
        let rl = limiter(1, 60);
        assert!(rl.check("a", t0()).is_allowed());
        assert!(!rl.check("a", t0()).is_allowed());
        assert!(rl.check("b", t0()).is_allowed());
        assert_eq!(rl.tracked_clients(), 2);
    }

    #[test]
    fn test_concurrent_checks_respect_quota() {
        let rl = Arc::new(limiter(50, 3600));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = Arc::clone(&rl);
                std::thread::spawn(move || (0..20).filter(|_| rl.check("shared", t0()).is_allowed()).count())
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
