//! Client for the external in-memory counter store (spec.md §3 "CounterKey
//! spaces", glossary "Counter store").
//!
//! Every operation that must be linearizable across concurrently-running
//! gateway processes (rate limiting, budget increments, the FIFO telemetry
//! backlog) is implemented as a single Lua script evaluated server-side, so
//! "read current state, decide, write new state" never splits across two
//! round trips.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("counter store error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("connecting to counter store timed out after {0:?}")]
    DialTimeout(Duration),
}

/// Outcome of a rate-limit check (spec.md §4.3: "Return (allowed, current count)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: i64,
}

/// Outcome of a token-bucket check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketDecision {
    pub allowed: bool,
    pub tokens_remaining: i64,
}

const SLIDING_WINDOW_SCRIPT: &str = r#"
-- KEYS[1] = ratelimit:<key>
-- ARGV[1] = now_ms
-- ARGV[2] = window_ms
-- ARGV[3] = limit
-- ARGV[4] = member (unique per request)
-- ARGV[5] = ttl_seconds
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
redis.call('ZADD', key, now, member)
redis.call('EXPIRE', key, ttl)
local count = redis.call('ZCARD', key)

if limit <= 0 then
  return {1, count}
end
if count <= limit then
  return {1, count}
else
  return {0, count}
end
"#;

const TOKEN_BUCKET_SCRIPT: &str = r#"
-- KEYS[1] = tokenbucket:<key>
-- ARGV[1] = now_ms
-- ARGV[2] = rate_per_minute (tokens added per 60_000 ms)
-- ARGV[3] = burst (bucket capacity)
-- ARGV[4] = cost
-- ARGV[5] = ttl_seconds
local key = KEYS[1]
local now = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local burst = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last = tonumber(state[2])
if tokens == nil then
  tokens = burst
  last = now
end

local elapsed = math.max(0, now - last)
local refilled = math.min(burst, tokens + (elapsed * rate / 60000.0))

local allowed = 0
if refilled >= cost then
  refilled = refilled - cost
  allowed = 1
end

redis.call('HSET', key, 'tokens', refilled, 'last_refill', now)
redis.call('EXPIRE', key, ttl)
return {allowed, math.floor(refilled)}
"#;

const BUDGET_INCR_SCRIPT: &str = r#"
-- KEYS[1] = cost:<key>:<yyyy>:<mm>
-- KEYS[2] = reqcount:<key>:<yyyy>:<mm>
-- ARGV[1] = delta_micros
-- ARGV[2] = ttl_seconds
local cost_key = KEYS[1]
local count_key = KEYS[2]
local delta = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])
local total_cost = redis.call('INCRBY', cost_key, delta)
redis.call('EXPIRE', cost_key, ttl)
local total_requests = redis.call('INCR', count_key)
redis.call('EXPIRE', count_key, ttl)
return {total_cost, total_requests}
"#;

/// A connected client over the counter store's Lua-script primitives.
#[derive(Clone)]
pub struct CounterStore {
    conn: ConnectionManager,
}

impl CounterStore {
    pub async fn connect(url: &str, dial_timeout: Duration) -> Result<Self, CounterError> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(dial_timeout, client.get_connection_manager())
            .await
            .map_err(|_| CounterError::DialTimeout(dial_timeout))??;
        Ok(Self { conn })
    }

    /// Sliding-window rate limit check (spec.md §4.3 "Sliding window").
    /// `limit <= 0` means unlimited and always allows, per spec.md §8's
    /// boundary behavior "Rate limit with limit=0: all requests pass."
    pub async fn sliding_window_check(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: i64,
        member: &str,
        ttl_seconds: i64,
    ) -> Result<RateLimitDecision, CounterError> {
        let mut conn = self.conn.clone();
        let (allowed, count): (i64, i64) = Script::new(SLIDING_WINDOW_SCRIPT)
            .key(format!("ratelimit:{key}"))
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(RateLimitDecision {
            allowed: allowed == 1,
            count,
        })
    }

    /// Token-bucket rate limit check (spec.md §4.3 "Token bucket").
    pub async fn token_bucket_check(
        &self,
        key: &str,
        now_ms: i64,
        rate_per_minute: f64,
        burst: f64,
        cost: f64,
        ttl_seconds: i64,
    ) -> Result<TokenBucketDecision, CounterError> {
        let mut conn = self.conn.clone();
        let (allowed, tokens_remaining): (i64, i64) = Script::new(TOKEN_BUCKET_SCRIPT)
            .key(format!("tokenbucket:{key}"))
            .arg(now_ms)
            .arg(rate_per_minute)
            .arg(burst)
            .arg(cost)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok(TokenBucketDecision {
            allowed: allowed == 1,
            tokens_remaining,
        })
    }

    /// Reads the current monthly cost accumulator in micro-dollars, `0` if unset
    /// (spec.md §4.4).
    pub async fn budget_get_micros(
        &self,
        api_key_id: &str,
        year_month_suffix: &str,
    ) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let key = format!("cost:{api_key_id}:{year_month_suffix}");
        let value: Option<i64> = conn.get(&key).await?;
        Ok(value.unwrap_or(0))
    }

    /// Atomically increments the monthly cost accumulator and its sibling
    /// request counter, refreshing both TTLs, returning
    /// `(total_cost_micros, total_requests)` (spec.md §4.4 "AddUsage").
    pub async fn budget_incr_micros(
        &self,
        api_key_id: &str,
        year_month_suffix: &str,
        delta_micros: i64,
        ttl_seconds: i64,
    ) -> Result<(i64, i64), CounterError> {
        let mut conn = self.conn.clone();
        let cost_key = format!("cost:{api_key_id}:{year_month_suffix}");
        let count_key = format!("reqcount:{api_key_id}:{year_month_suffix}");
        let (total_cost, total_requests): (i64, i64) = Script::new(BUDGET_INCR_SCRIPT)
            .key(cost_key)
            .key(count_key)
            .arg(delta_micros)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await?;
        Ok((total_cost, total_requests))
    }

    /// Reads the current monthly request counter, `0` if unset.
    pub async fn budget_request_count(
        &self,
        api_key_id: &str,
        year_month_suffix: &str,
    ) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let key = format!("reqcount:{api_key_id}:{year_month_suffix}");
        let value: Option<i64> = conn.get(&key).await?;
        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    // Exercising these scripts end to end needs a live counter store; see
    // `tests/live_redis.rs` (gated behind `#[ignore]` and `COUNTER_STORE_TEST_URL`).
    // Logic that doesn't need a connection is covered here.
    #[test]
    fn script_text_has_no_unbalanced_lua_blocks() {
        for script in [
            super::SLIDING_WINDOW_SCRIPT,
            super::TOKEN_BUCKET_SCRIPT,
            super::BUDGET_INCR_SCRIPT,
        ] {
            let ifs = script.matches("if ").count();
            let ends = script.matches("end").count();
            assert!(ends >= ifs, "every `if` needs a matching `end`");
        }
    }
}
