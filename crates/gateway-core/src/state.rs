//! Shared, request-independent state the pipeline reads on every call.

use std::sync::Arc;
use std::time::Duration;

use gateway_budget::BudgetAccountant;
use gateway_cache::LruTtlCache;
use gateway_provider_core::ProviderRegistry;
use gateway_ratelimit::RateLimiter;
use gateway_store::{ApiKeyRow, Storage};
use gateway_telemetry::TelemetryBus;

pub struct GatewayState {
    pub storage: Arc<dyn Storage>,
    pub api_key_cache: Arc<LruTtlCache<String, ApiKeyRow>>,
    pub registry: Arc<ProviderRegistry>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub budget: BudgetAccountant,
    pub telemetry: Arc<TelemetryBus>,
    pub provider_request_timeout: Duration,
}
