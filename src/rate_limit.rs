//! Persisted question quota.
//!
//! The window is fixed, not rolling: it is armed only when the counter first
//! reaches [`MAX_REQUESTS`], so a burst of `MAX_REQUESTS` questions all go
//! through and only the next one is refused. A stored `resetTime` of zero
//! means the window has not been armed yet.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::storage::Storage;

pub const MAX_REQUESTS: u32 = 5;
pub const WINDOW_DURATION: Duration = Duration::from_secs(10 * 60);
pub const STORAGE_KEY: &str = "chat_rate_limit";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub count: u32,
    /// Epoch milliseconds, zero while no window is armed
    pub reset_time: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub time_until_reset: Duration,
}

pub struct RateLimiter {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Corrupt or missing entries read as `{0, 0}`.
    pub fn load(&self) -> RateLimitState {
        let raw = match self.storage.get(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return RateLimitState::default(),
            Err(err) => {
                warn!("rate limit state unreadable, starting fresh: {err}");
                return RateLimitState::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("rate limit state corrupt, starting fresh: {err}");
            RateLimitState::default()
        })
    }

    fn save(&self, state: RateLimitState) {
        let encoded = match serde_json::to_string(&state) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("failed to encode rate limit state: {err}");
                return;
            }
        };
        if let Err(err) = self.storage.set(STORAGE_KEY, &encoded) {
            warn!("failed to persist rate limit state: {err}");
        }
    }

    pub fn check_limit(&self) -> LimitStatus {
        let now = self.clock.now_millis();
        let state = self.load();

        if window_expired(&state, now) {
            if state != RateLimitState::default() {
                debug!(count = state.count, "rate limit window expired, resetting");
            }
            self.save(RateLimitState::default());
            return LimitStatus {
                allowed: true,
                remaining: MAX_REQUESTS,
                time_until_reset: Duration::ZERO,
            };
        }

        if state.count >= MAX_REQUESTS {
            let left = (state.reset_time - now).max(0) as u64;
            return LimitStatus {
                allowed: false,
                remaining: 0,
                time_until_reset: Duration::from_millis(left),
            };
        }

        LimitStatus {
            allowed: true,
            remaining: MAX_REQUESTS - state.count,
            time_until_reset: Duration::ZERO,
        }
    }

    pub fn record_request(&self) {
        let now = self.clock.now_millis();
        let state = self.load();
        let count = state.count.saturating_add(1);
        let reset_time = if count >= MAX_REQUESTS && state.reset_time == 0 {
            debug!("question quota used up, arming cooldown window");
            now + WINDOW_DURATION.as_millis() as i64
        } else {
            state.reset_time
        };

        self.save(RateLimitState { count, reset_time });
    }
}

fn window_expired(state: &RateLimitState, now: i64) -> bool {
    if state.reset_time == 0 {
        // A full counter without a deadline can only come from a bad write.
        state.count >= MAX_REQUESTS
    } else {
        now >= state.reset_time
    }
}

/// Whole minutes, rounded up.
pub fn minutes_ceil(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(60_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{MemoryStorage, StorageError, StorageResult};
    use std::io;

    fn limiter() -> (RateLimiter, Arc<MemoryStorage>, ManualClock) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(1_700_000_000_000);
        let limiter = RateLimiter::new(storage.clone(), Arc::new(clock.clone()));
        (limiter, storage, clock)
    }

    #[test]
    fn burst_of_max_requests_counts_down_to_zero() {
        let (limiter, _, _) = limiter();
        let mut seen = Vec::new();
        for _ in 0..MAX_REQUESTS {
            let status = limiter.check_limit();
            assert!(status.allowed);
            seen.push(status.remaining);
            limiter.record_request();
        }
        seen.push(limiter.check_limit().remaining);
        assert_eq!(seen, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn sixth_request_is_refused_within_window() {
        let (limiter, _, clock) = limiter();
        for _ in 0..MAX_REQUESTS {
            limiter.record_request();
        }
        clock.advance(Duration::from_secs(30));

        let status = limiter.check_limit();
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
        assert!(status.time_until_reset > Duration::ZERO);
        assert!(status.time_until_reset <= WINDOW_DURATION);
        assert_eq!(
            status.time_until_reset,
            WINDOW_DURATION - Duration::from_secs(30)
        );
    }

    #[test]
    fn expired_window_resets_persisted_state() {
        let (limiter, storage, clock) = limiter();
        for _ in 0..MAX_REQUESTS {
            limiter.record_request();
        }
        clock.advance(WINDOW_DURATION);

        let status = limiter.check_limit();
        assert_eq!(
            status,
            LimitStatus {
                allowed: true,
                remaining: MAX_REQUESTS,
                time_until_reset: Duration::ZERO,
            }
        );
        assert_eq!(limiter.load(), RateLimitState::default());
        assert_eq!(
            storage.get(STORAGE_KEY).unwrap().as_deref(),
            Some(r#"{"count":0,"resetTime":0}"#)
        );
    }

    #[test]
    fn reset_time_is_armed_once() {
        let (limiter, _, clock) = limiter();
        for _ in 0..MAX_REQUESTS {
            limiter.record_request();
        }
        let armed = limiter.load().reset_time;
        assert_eq!(armed, clock.now_millis() + WINDOW_DURATION.as_millis() as i64);

        clock.advance(Duration::from_secs(60));
        limiter.record_request();
        assert_eq!(limiter.load().reset_time, armed);
        assert_eq!(limiter.load().count, MAX_REQUESTS + 1);
    }

    #[test]
    fn counter_below_limit_keeps_epoch_zero_reset() {
        let (limiter, _, _) = limiter();
        limiter.record_request();
        limiter.record_request();
        assert_eq!(
            limiter.load(),
            RateLimitState {
                count: 2,
                reset_time: 0
            }
        );
        assert_eq!(limiter.check_limit().remaining, 3);
    }

    #[test]
    fn corrupt_state_degrades_to_fresh_window() {
        let (limiter, storage, _) = limiter();
        storage.set(STORAGE_KEY, "{not json").unwrap();
        assert_eq!(limiter.load(), RateLimitState::default());
        assert!(limiter.check_limit().allowed);

        storage.set(STORAGE_KEY, r#"{"count":-3,"resetTime":"soon"}"#).unwrap();
        assert_eq!(limiter.load(), RateLimitState::default());
    }

    #[test]
    fn full_counter_without_deadline_is_reset() {
        let (limiter, storage, _) = limiter();
        storage.set(STORAGE_KEY, r#"{"count":9,"resetTime":0}"#).unwrap();
        let status = limiter.check_limit();
        assert!(status.allowed);
        assert_eq!(status.remaining, MAX_REQUESTS);
    }

    /// Backend whose writes always fail; reads fail too unless `readable`.
    struct FailingStorage {
        readable: bool,
    }

    impl Storage for FailingStorage {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            if self.readable {
                Ok(None)
            } else {
                Err(StorageError::Read(io::Error::other("disk gone")))
            }
        }

        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Write(io::Error::other("read-only filesystem")))
        }

        fn remove(&self, _key: &str) -> StorageResult<()> {
            Err(StorageError::Poisoned)
        }
    }

    #[test]
    fn failing_backend_keeps_questions_allowed() {
        for readable in [false, true] {
            let clock = ManualClock::new(1_700_000_000_000);
            let limiter = RateLimiter::new(Arc::new(FailingStorage { readable }), Arc::new(clock));

            assert_eq!(limiter.load(), RateLimitState::default());
            for _ in 0..MAX_REQUESTS + 1 {
                let status = limiter.check_limit();
                assert!(status.allowed);
                assert_eq!(status.remaining, MAX_REQUESTS);
                limiter.record_request();
            }
        }
    }

    #[test]
    fn minutes_round_up() {
        assert_eq!(minutes_ceil(Duration::ZERO), 0);
        assert_eq!(minutes_ceil(Duration::from_millis(1)), 1);
        assert_eq!(minutes_ceil(Duration::from_secs(60)), 1);
        assert_eq!(minutes_ceil(Duration::from_secs(61)), 2);
        assert_eq!(minutes_ceil(WINDOW_DURATION), 10);
    }
}
