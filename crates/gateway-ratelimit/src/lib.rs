//! Sliding-window and token-bucket rate limiting over the shared counter
//! store (spec.md §4.3).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use gateway_counters::{CounterError, CounterStore};

const WINDOW_MS: i64 = 60_000;
const COUNTER_TTL_SECONDS: i64 = 120;

/// Outcome of a rate-limit check, independent of which algorithm produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Current count (sliding window) or remaining tokens (token bucket);
    /// exposed for logging/metrics, not for decision-making by the caller.
    pub current: i64,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Checks and records one request against `key_id`'s quota.
    /// `limit_per_minute == 0` means unlimited (spec.md §8 boundary:
    /// "Rate limit with limit=0: all requests pass").
    async fn check(
        &self,
        key_id: &str,
        limit_per_minute: u32,
    ) -> Result<RateLimitDecision, CounterError>;
}

/// Primary algorithm (spec.md §4.3 "Sliding window (primary)").
pub struct SlidingWindowLimiter {
    store: CounterStore,
    sequence: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(store: CounterStore) -> Self {
        Self {
            store,
            sequence: AtomicU64::new(0),
        }
    }

    /// Unique-per-request member so two requests landing in the same
    /// millisecond never collide in the sorted set (spec.md §4.3
    /// "Correctness").
    fn next_member(&self, now_ms: i64) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format_member(now_ms, seq)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(
        &self,
        key_id: &str,
        limit_per_minute: u32,
    ) -> Result<RateLimitDecision, CounterError> {
        let now_ms = now_millis();
        let member = self.next_member(now_ms);
        let decision = self
            .store
            .sliding_window_check(
                key_id,
                now_ms,
                WINDOW_MS,
                limit_per_minute as i64,
                &member,
                COUNTER_TTL_SECONDS,
            )
            .await?;
        Ok(RateLimitDecision {
            allowed: decision.allowed,
            current: decision.count,
        })
    }
}

/// Alternative algorithm (spec.md §4.3 "Token bucket (alternative)"). The
/// bucket's burst capacity equals the per-minute limit and each request
/// costs one token, refilled continuously at `limit_per_minute` tokens per
/// 60 seconds.
pub struct TokenBucketLimiter {
    store: CounterStore,
}

impl TokenBucketLimiter {
    pub fn new(store: CounterStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn check(
        &self,
        key_id: &str,
        limit_per_minute: u32,
    ) -> Result<RateLimitDecision, CounterError> {
        if limit_per_minute == 0 {
            return Ok(RateLimitDecision {
                allowed: true,
                current: i64::MAX,
            });
        }
        let now_ms = now_millis();
        let decision = self
            .store
            .token_bucket_check(
                key_id,
                now_ms,
                limit_per_minute as f64,
                limit_per_minute as f64,
                1.0,
                COUNTER_TTL_SECONDS,
            )
            .await?;
        Ok(RateLimitDecision {
            allowed: decision.allowed,
            current: decision.tokens_remaining,
        })
    }
}

fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn format_member(now_ms: i64, seq: u64) -> String {
    format!("{now_ms}-{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_members_are_unique_within_the_same_millisecond() {
        let a = format_member(1_000, 0);
        let b = format_member(1_000, 1);
        assert_ne!(a, b);
    }
}
