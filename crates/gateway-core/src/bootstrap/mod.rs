//! Process wiring: CLI/ENV config, storage connection, and the background
//! tasks that keep caches, the provider registry, and budget summaries warm
//! (spec.md §6, §4.4, §4.5).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gateway_budget::{BudgetAccountant, BudgetReconciler};
use gateway_cache::{LruTtlCache, spawn_sweeper};
use gateway_common::{
    CacheConfig, CounterStoreConfig, DbPoolConfig, GlobalConfig, RateLimitAlgorithm, RegistryConfig, ServerConfig,
    TelemetryConfig,
};
use gateway_counters::CounterStore;
use gateway_crypto::CredentialCipher;
use gateway_provider_core::{DriverFactoryRegistry, ProviderRegistry};
use gateway_ratelimit::{RateLimiter, SlidingWindowLimiter, TokenBucketLimiter};
use gateway_store::{ApiKeyRow, SeaOrmStorage, Storage};
use gateway_telemetry::TelemetryBus;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::state::GatewayState;

#[derive(Debug, Clone, Parser)]
#[command(name = "gateway", version, about = "OpenAI-compatible multi-provider LLM gateway")]
pub struct CliArgs {
    #[arg(long, env = "GATEWAY_DSN")]
    pub dsn: Option<String>,

    #[arg(long, env = "GATEWAY_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "GATEWAY_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "GATEWAY_COUNTER_STORE_URL")]
    pub counter_store_url: Option<String>,

    #[arg(long, env = "GATEWAY_CREDENTIAL_KEY")]
    pub credential_key: String,

    #[arg(long, env = "GATEWAY_ADMIN_JWT_SECRET")]
    pub admin_jwt_secret: String,

    #[arg(long, env = "GATEWAY_RATE_LIMIT_ALGORITHM")]
    pub rate_limit_algorithm: Option<String>,

    #[arg(long, env = "GATEWAY_TELEMETRY_OBJECT_STORE_URL")]
    pub telemetry_object_store_url: Option<String>,

    #[arg(long, env = "GATEWAY_TELEMETRY_LOG_KEY_PREFIX")]
    pub telemetry_log_key_prefix: Option<String>,

    #[arg(long, env = "GATEWAY_POD_ID")]
    pub pod_id: Option<String>,

    #[arg(long, env = "GATEWAY_PROVIDER_RELOAD_INTERVAL_SECS")]
    pub provider_reload_interval_secs: Option<u64>,
}

pub struct Bootstrap {
    pub storage: Arc<dyn Storage>,
    pub state: Arc<GatewayState>,
    pub config: GlobalConfig,
    /// Background tasks (registry reload ticker, cache sweepers, budget
    /// reconciler). Kept alive for the lifetime of the process; never
    /// awaited.
    pub background: Vec<JoinHandle<()>>,
    /// Exposed so the admin surface can drive an out-of-band reload with
    /// the same factories and credential cipher the periodic ticker uses.
    pub factories: Arc<DriverFactoryRegistry>,
    pub cipher: Arc<CredentialCipher>,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    bootstrap(CliArgs::parse()).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let config = merge_config(&args)?;

    let storage: Arc<dyn Storage> = Arc::new(SeaOrmStorage::connect(&config.db.database_url).await.context("connect storage")?);
    storage.sync().await.context("schema sync")?;

    let cipher = Arc::new(CredentialCipher::from_base64_key(&args.credential_key).context("load credential key")?);

    let counters = CounterStore::connect(&config.counter_store.url, config.counter_store.dial_timeout)
        .await
        .context("connect counter store")?;

    let factories = Arc::new({
        let mut factories = DriverFactoryRegistry::new();
        gateway_provider_impl::register_all(&mut factories);
        factories
    });

    let registry = Arc::new(ProviderRegistry::new());
    registry
        .reload(storage.as_ref(), &factories, &cipher)
        .await
        .context("initial provider registry load")?;

    let api_key_cache: LruTtlCache<String, ApiKeyRow> =
        LruTtlCache::new(config.cache.api_key_size, config.cache.api_key_ttl);
    let api_key_cache = Arc::new(api_key_cache);

    let rate_limiter: Arc<dyn RateLimiter> = match config.rate_limit_algorithm {
        RateLimitAlgorithm::SlidingWindow => Arc::new(SlidingWindowLimiter::new(counters.clone())),
        RateLimitAlgorithm::TokenBucket => Arc::new(TokenBucketLimiter::new(counters.clone())),
    };

    let budget = BudgetAccountant::new(counters.clone());

    let object_store_url =
        url::Url::parse(&config.telemetry.object_store_url).context("parse telemetry object store url")?;
    let (object_store, _path) = object_store::parse_url(&object_store_url).context("build telemetry object store")?;
    let telemetry = Arc::new(TelemetryBus::spawn(config.telemetry.clone(), Arc::from(object_store), budget.clone()));

    let mut background = Vec::new();

    background.push(spawn_sweeper(api_key_cache.clone(), config.cache.api_key_ttl));

    background.push(
        BudgetReconciler::new(counters.clone(), storage.clone(), Duration::from_secs(5 * 60)).spawn(),
    );

    if let Some(interval) = config.registry.reload_interval {
        background.push(spawn_registry_reload(
            registry.clone(),
            storage.clone(),
            factories.clone(),
            cipher.clone(),
            interval,
        ));
    }

    let state = Arc::new(GatewayState {
        storage: storage.clone(),
        api_key_cache,
        registry,
        rate_limiter,
        budget,
        telemetry,
        provider_request_timeout: config.registry.request_timeout,
    });

    Ok(Bootstrap { storage, state, config, background, factories, cipher })
}

fn spawn_registry_reload(
    registry: Arc<ProviderRegistry>,
    storage: Arc<dyn Storage>,
    factories: Arc<DriverFactoryRegistry>,
    cipher: Arc<CredentialCipher>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = registry.reload(storage.as_ref(), &factories, &cipher).await {
                warn!(event = "registry_reload_failed", error = %err, "keeping previous snapshot");
            }
        }
    })
}

/// CLI > ENV (via clap's `env` attribute) > built-in default (spec.md §6).
fn merge_config(args: &CliArgs) -> anyhow::Result<GlobalConfig> {
    let server = ServerConfig {
        host: args.host.clone().unwrap_or_else(|| ServerConfig::default().host),
        port: args.port.unwrap_or_else(|| ServerConfig::default().port),
    };

    let db = DbPoolConfig {
        database_url: args.dsn.clone().context("GATEWAY_DSN is required")?,
        ..db_defaults()
    };

    let counter_store = CounterStoreConfig {
        url: args.counter_store_url.clone().unwrap_or_else(|| CounterStoreConfig::default().url),
        ..CounterStoreConfig::default()
    };

    let rate_limit_algorithm = match &args.rate_limit_algorithm {
        Some(raw) => raw.parse().map_err(|err: gateway_common::ConfigError| anyhow::anyhow!(err))?,
        None => RateLimitAlgorithm::default(),
    };

    let mut telemetry = TelemetryConfig::default();
    if let Some(url) = &args.telemetry_object_store_url {
        telemetry.object_store_url = url.clone();
    }
    if let Some(prefix) = &args.telemetry_log_key_prefix {
        telemetry.log_key_prefix = prefix.clone();
    }
    if let Some(pod_id) = &args.pod_id {
        telemetry.pod_id = pod_id.clone();
    }

    let mut registry = RegistryConfig::default();
    if let Some(secs) = args.provider_reload_interval_secs {
        registry.reload_interval = if secs == 0 { None } else { Some(Duration::from_secs(secs)) };
    }

    if args.admin_jwt_secret.trim().is_empty() {
        anyhow::bail!("GATEWAY_ADMIN_JWT_SECRET must not be empty");
    }

    Ok(GlobalConfig {
        server,
        db,
        cache: CacheConfig::default(),
        counter_store,
        rate_limit_algorithm,
        registry,
        telemetry,
        admin_jwt_secret: args.admin_jwt_secret.clone(),
    })
}

fn db_defaults() -> DbPoolConfig {
    DbPoolConfig {
        database_url: String::new(),
        max_open_conns: 20,
        max_idle_conns: 5,
        conn_max_lifetime: Duration::from_secs(30 * 60),
        conn_max_idle_time: Duration::from_secs(10 * 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            dsn: Some("sqlite://gateway.db?mode=rwc".to_string()),
            host: None,
            port: None,
            counter_store_url: None,
            credential_key: "unused-in-this-test".to_string(),
            admin_jwt_secret: "super-secret".to_string(),
            rate_limit_algorithm: None,
            telemetry_object_store_url: None,
            telemetry_log_key_prefix: None,
            pod_id: None,
            provider_reload_interval_secs: None,
        }
    }

    #[test]
    fn merges_defaults_when_only_the_dsn_is_set() {
        let config = merge_config(&base_args()).unwrap();
        assert_eq!(config.server.port, ServerConfig::default().port);
        assert_eq!(config.rate_limit_algorithm, RateLimitAlgorithm::SlidingWindow);
    }

    #[test]
    fn zero_reload_interval_disables_periodic_reload() {
        let mut args = base_args();
        args.provider_reload_interval_secs = Some(0);
        let config = merge_config(&args).unwrap();
        assert_eq!(config.registry.reload_interval, None);
    }

    #[test]
    fn rejects_an_empty_admin_jwt_secret() {
        let mut args = base_args();
        args.admin_jwt_secret = "  ".to_string();
        assert!(merge_config(&args).is_err());
    }

    #[test]
    fn missing_dsn_is_rejected() {
        let mut args = base_args();
        args.dsn = None;
        assert!(merge_config(&args).is_err());
    }
}
