//! Shared configuration and value types used across the gateway workspace.
//!
//! Nothing in this crate talks to a network or a database; it only holds the
//! config shapes and small domain values (money, calendar buckets) that every
//! other crate needs without pulling in their dependencies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod money;
pub mod month;

pub use money::UsdAmount;
pub use month::YearMonth;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config value: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// HTTP server bind settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Durable-store connection pool settings (spec.md §6, `DB_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbPoolConfig {
    pub database_url: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
    pub conn_max_idle_time: Duration,
}

/// Cache sizing (spec.md §4.2 / §6, `CACHE_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub api_key_size: usize,
    pub api_key_ttl: Duration,
    pub model_size: usize,
    pub model_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            api_key_size: 1000,
            api_key_ttl: Duration::from_secs(5 * 60),
            model_size: 500,
            model_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Counter-store (external in-memory store) connection settings (spec.md §6, `REDIS_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterStoreConfig {
    pub url: String,
    pub pool_size: u32,
    pub min_idle_conns: u32,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: 10,
            min_idle_conns: 2,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// Rate limiting algorithm selection (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RateLimitAlgorithm {
    #[default]
    SlidingWindow,
    TokenBucket,
}

impl std::str::FromStr for RateLimitAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "sliding-window" | "slidingwindow" => Ok(Self::SlidingWindow),
            "token-bucket" | "tokenbucket" => Ok(Self::TokenBucket),
            other => Err(ConfigError::InvalidValue {
                field: "RATE_LIMIT_ALGORITHM",
                value: other.to_string(),
            }),
        }
    }
}

/// Provider registry reload cadence (spec.md §4.5 / §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `None` (from a zero interval) disables periodic reload.
    pub reload_interval: Option<Duration>,
    pub request_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reload_interval: Some(Duration::from_secs(5 * 60)),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Telemetry queue/flush settings (spec.md §4.6 / §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub object_store_url: String,
    pub log_key_prefix: String,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_retries: u32,
    pub retry_base: Duration,
    pub gzip: bool,
    pub log_queue_capacity: usize,
    pub billing_queue_capacity: usize,
    pub shutdown_drain_deadline: Duration,
    pub pod_id: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            object_store_url: "file:///var/lib/gateway/logs".to_string(),
            log_key_prefix: "gateway-logs".to_string(),
            batch_size: 100,
            batch_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_base: Duration::from_millis(500),
            gzip: false,
            log_queue_capacity: 100_000,
            billing_queue_capacity: 100_000,
            shutdown_drain_deadline: Duration::from_secs(30),
            pod_id: "gateway".to_string(),
        }
    }
}

/// Final, merged configuration used by the running process.
///
/// Merge order (after DB connection is known): CLI > ENV > built-in default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub server: ServerConfig,
    pub db: DbPoolConfig,
    pub cache: CacheConfig,
    pub counter_store: CounterStoreConfig,
    pub rate_limit_algorithm: RateLimitAlgorithm,
    pub registry: RegistryConfig,
    pub telemetry: TelemetryConfig,
    pub admin_jwt_secret: String,
}

/// Project a UTC timestamp's (year, month) calendar bucket used by the
/// budget accountant's cost accumulator and the reconciler's summary key.
pub fn current_year_month(now: time::OffsetDateTime) -> YearMonth {
    YearMonth::new(now.year(), now.month() as u8)
}
