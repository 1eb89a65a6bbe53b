use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use gateway_crypto::CredentialCipher;
use gateway_store::{RegistrySnapshot, Storage};
use tracing::{info, warn};

use crate::driver::Driver;
use crate::factory::DriverFactoryRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("storage error: {0}")]
    Storage(#[from] gateway_store::StorageError),
    #[error("credential decryption failed for provider {provider_id}: {source}")]
    Decrypt {
        provider_id: i64,
        #[source]
        source: gateway_crypto::CryptoError,
    },
    #[error("driver construction failed for provider {provider_id}: {source}")]
    Build {
        provider_id: i64,
        #[source]
        source: crate::driver::DriverError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown model or alias: {0}")]
    NotFound(String),
    #[error("alias or model references a provider not present in the current snapshot (reload race)")]
    StaleProvider,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub model_id: i64,
    pub input_price_per_1k_usd_micros: i64,
    pub output_price_per_1k_usd_micros: i64,
}

/// The registry's four live mappings (spec.md §4.5), bundled into one struct
/// so a reload is a single atomic pointer swap rather than four independent
/// ones -- readers never observe a half-swapped state (spec.md §8 scenario 6).
#[derive(Default)]
struct LiveSnapshot {
    drivers: HashMap<i64, Arc<dyn Driver>>,
    model_to_provider: HashMap<String, i64>,
    alias_to_provider: HashMap<String, i64>,
    alias_to_native_model: HashMap<String, String>,
    /// Keyed by provider-native model name; pricing does not vary by alias.
    model_pricing: HashMap<String, ModelPricing>,
}

/// Polls the driver's reference count and closes it once the registry's own
/// snapshot is the last holder, or after a bounded number of attempts so a
/// leaked reference can never wedge the reload path's cleanup forever.
fn close_when_unreferenced(driver: Arc<dyn Driver>) {
    tokio::spawn(async move {
        const MAX_ATTEMPTS: u32 = 60;
        for _ in 0..MAX_ATTEMPTS {
            if Arc::strong_count(&driver) <= 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        driver.close().await;
    });
}

pub struct ProviderRegistry {
    live: ArcSwap<LiveSnapshot>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            live: ArcSwap::from_pointee(LiveSnapshot::default()),
        }
    }

    /// Resolves a public-facing model name or alias to a live driver, the
    /// provider-native model name to send upstream, and that model's
    /// pricing. Tries the alias map first, then the direct model map
    /// (spec.md §4.5 "Resolution").
    pub fn resolve(&self, name: &str) -> Result<(Arc<dyn Driver>, String, ModelPricing), ResolveError> {
        let snapshot = self.live.load();

        let (provider_id, native_model) =
            if let Some(provider_id) = snapshot.alias_to_provider.get(name) {
                let native = snapshot
                    .alias_to_native_model
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.to_string());
                (*provider_id, native)
            } else if let Some(provider_id) = snapshot.model_to_provider.get(name) {
                (*provider_id, name.to_string())
            } else {
                return Err(ResolveError::NotFound(name.to_string()));
            };

        let driver = snapshot
            .drivers
            .get(&provider_id)
            .cloned()
            .ok_or(ResolveError::StaleProvider)?;
        let pricing = snapshot
            .model_pricing
            .get(&native_model)
            .copied()
            .unwrap_or(ModelPricing {
                model_id: 0,
                input_price_per_1k_usd_micros: 0,
                output_price_per_1k_usd_micros: 0,
            });

        Ok((driver, native_model, pricing))
    }

    /// Pulls providers/models/aliases from durable storage, decrypts
    /// credentials, builds drivers via `factories`, and atomically swaps
    /// the live snapshot. On any credential decryption or driver-build
    /// failure the whole reload is aborted and the previous snapshot
    /// remains live (spec.md §4.5 "Decryption failure on any provider
    /// aborts the whole reload").
    pub async fn reload(
        &self,
        storage: &dyn Storage,
        factories: &DriverFactoryRegistry,
        cipher: &CredentialCipher,
    ) -> Result<(), ReloadError> {
        let snapshot: RegistrySnapshot = storage.load_registry_snapshot().await?;

        let mut drivers = HashMap::with_capacity(snapshot.providers.len());
        for provider in snapshot.providers.iter().filter(|p| p.enabled) {
            let credentials = cipher
                .decrypt(&provider.credential_blob)
                .map_err(|source| ReloadError::Decrypt {
                    provider_id: provider.id,
                    source,
                })?;
            let driver = factories
                .build(&provider.type_tag, provider.id, credentials, &provider.config_json)
                .await
                .map_err(|source| ReloadError::Build {
                    provider_id: provider.id,
                    source,
                })?;
            drivers.insert(provider.id, driver);
        }

        let mut model_to_provider = HashMap::with_capacity(snapshot.models.len());
        let mut model_pricing = HashMap::with_capacity(snapshot.models.len());
        for model in &snapshot.models {
            if drivers.contains_key(&model.provider_id) {
                model_to_provider.insert(model.name.clone(), model.provider_id);
                model_pricing.insert(
                    model.name.clone(),
                    ModelPricing {
                        model_id: model.id,
                        input_price_per_1k_usd_micros: model.input_price_per_1k_usd_micros,
                        output_price_per_1k_usd_micros: model.output_price_per_1k_usd_micros,
                    },
                );
            }
        }

        let mut alias_to_provider = HashMap::with_capacity(snapshot.aliases.len());
        let mut alias_to_native_model = HashMap::with_capacity(snapshot.aliases.len());
        let model_by_id: HashMap<i64, &gateway_store::ModelRow> =
            snapshot.models.iter().map(|m| (m.id, m)).collect();
        for alias in snapshot.aliases.iter().filter(|a| a.enabled) {
            let Some(model) = model_by_id.get(&alias.model_id) else {
                continue;
            };
            let provider_id = alias.provider_override_id.unwrap_or(model.provider_id);
            if !drivers.contains_key(&provider_id) {
                continue;
            }
            alias_to_provider.insert(alias.alias.clone(), provider_id);
            alias_to_native_model.insert(alias.alias.clone(), model.name.clone());
        }

        let new_live = LiveSnapshot {
            drivers,
            model_to_provider,
            alias_to_provider,
            alias_to_native_model,
            model_pricing,
        };

        let previous = self.live.swap(Arc::new(new_live));
        info!(
            event = "registry_reloaded",
            providers = previous.drivers.len(),
            new_providers = self.live.load().drivers.len()
        );

        // `Close()` is deferred until a driver has no other holders left, so an
        // in-flight `resolve()` caller still holding its `Arc` finishes its
        // call against a live driver (spec.md §8 scenario 6).
        for (_, driver) in previous.drivers.iter() {
            close_when_unreferenced(driver.clone());
        }

        Ok(())
    }
}
