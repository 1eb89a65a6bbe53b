use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use gateway_crypto::{CredentialCipher, CredentialMap};
use gateway_provider_core::{
    ChatBody, ChatRequest, ChatResponse, Driver, DriverContext, DriverError, DriverFactory,
    DriverFactoryRegistry, ProviderRegistry,
};
use gateway_store::{
    AliasRow, ApiKeyPatch, ModelRow, MonthlyUsageSummaryUpsert, NewApiKeyInput, ProviderRow,
    RegistrySnapshot, Storage, StorageResult, UsageRecordInput,
};
use serde_json::Value as JsonValue;

struct StubDriver {
    id: i64,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Driver for StubDriver {
    fn id(&self) -> i64 {
        self.id
    }

    fn type_tag(&self) -> &str {
        "stub"
    }

    async fn chat(&self, _ctx: DriverContext, _req: ChatRequest) -> Result<ChatResponse, DriverError> {
        Ok(ChatResponse {
            status: 200,
            body: ChatBody::Buffered(bytes::Bytes::from_static(b"{}")),
            upstream_latency_ms: 1,
            reported_cost_usd_micros: Some(0),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    async fn validate_credentials(&self, _ctx: DriverContext) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubFactory {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl DriverFactory for StubFactory {
    fn type_tag(&self) -> &'static str {
        "stub"
    }

    async fn build(
        &self,
        provider_id: i64,
        _credentials: CredentialMap,
        _config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        Ok(Arc::new(StubDriver {
            id: provider_id,
            closed: self.closed.clone(),
        }))
    }
}

struct StubStorage {
    snapshot: RegistrySnapshot,
}

#[async_trait]
impl Storage for StubStorage {
    async fn sync(&self) -> StorageResult<()> {
        Ok(())
    }
    async fn get_api_key_by_secret_hash(
        &self,
        _hash: &str,
    ) -> StorageResult<Option<gateway_store::ApiKeyRow>> {
        Ok(None)
    }
    async fn insert_api_key(&self, _input: NewApiKeyInput) -> StorageResult<gateway_store::ApiKeyRow> {
        unimplemented!()
    }
    async fn patch_api_key(&self, _id: i64, _patch: ApiKeyPatch) -> StorageResult<gateway_store::ApiKeyRow> {
        unimplemented!()
    }
    async fn delete_api_key(&self, _id: i64) -> StorageResult<()> {
        Ok(())
    }
    async fn list_enabled_api_key_ids(&self) -> StorageResult<Vec<i64>> {
        Ok(Vec::new())
    }
    async fn load_registry_snapshot(&self) -> StorageResult<RegistrySnapshot> {
        Ok(self.snapshot.clone())
    }
    async fn upsert_provider(
        &self,
        _name: &str,
        _type_tag: &str,
        _credential_blob: Vec<u8>,
        _config_json: JsonValue,
        _enabled: bool,
    ) -> StorageResult<i64> {
        unimplemented!()
    }
    async fn set_provider_enabled(&self, _provider_id: i64, _enabled: bool) -> StorageResult<()> {
        Ok(())
    }
    async fn upsert_model(
        &self,
        _provider_id: i64,
        _name: &str,
        _input_price: i64,
        _output_price: i64,
    ) -> StorageResult<i64> {
        unimplemented!()
    }
    async fn upsert_alias(
        &self,
        _alias: &str,
        _model_id: i64,
        _provider_override_id: Option<i64>,
        _enabled: bool,
    ) -> StorageResult<i64> {
        unimplemented!()
    }
    async fn append_usage_record(&self, _record: UsageRecordInput) -> StorageResult<()> {
        Ok(())
    }
    async fn upsert_monthly_summary(&self, _summary: MonthlyUsageSummaryUpsert) -> StorageResult<()> {
        Ok(())
    }
}

fn test_cipher() -> CredentialCipher {
    let key = base64::engine::general_purpose::STANDARD.encode([3u8; 32]);
    CredentialCipher::from_base64_key(&key).unwrap()
}

fn snapshot_with_alias() -> RegistrySnapshot {
    RegistrySnapshot {
        providers: vec![ProviderRow {
            id: 1,
            name: "openai-main".into(),
            type_tag: "stub".into(),
            enabled: true,
            credential_blob: Vec::new(),
            config_json: JsonValue::Null,
        }],
        models: vec![ModelRow {
            id: 10,
            provider_id: 1,
            name: "gpt-4o".into(),
            input_price_per_1k_usd_micros: 1,
            output_price_per_1k_usd_micros: 1,
        }],
        aliases: vec![AliasRow {
            id: 100,
            alias: "proj-gpt".into(),
            model_id: 10,
            provider_override_id: None,
            enabled: true,
        }],
    }
}

#[tokio::test]
async fn resolves_alias_to_provider_native_model_name() {
    let storage = StubStorage { snapshot: snapshot_with_alias() };
    let mut factories = DriverFactoryRegistry::new();
    factories.register(Arc::new(StubFactory { closed: Arc::new(AtomicUsize::new(0)) }));
    let cipher = test_cipher();

    let registry = ProviderRegistry::new();
    registry.reload(&storage, &factories, &cipher).await.unwrap();

    let (driver, native_model, _pricing) = registry.resolve("proj-gpt").unwrap();
    assert_eq!(native_model, "gpt-4o");
    assert_eq!(driver.id(), 1);
}

#[tokio::test]
async fn alias_resolution_is_idempotent_through_the_direct_model() {
    let storage = StubStorage { snapshot: snapshot_with_alias() };
    let mut factories = DriverFactoryRegistry::new();
    factories.register(Arc::new(StubFactory { closed: Arc::new(AtomicUsize::new(0)) }));
    let cipher = test_cipher();

    let registry = ProviderRegistry::new();
    registry.reload(&storage, &factories, &cipher).await.unwrap();

    let (_, via_alias, _) = registry.resolve("proj-gpt").unwrap();
    let (_, via_direct, _) = registry.resolve(&via_alias).unwrap();
    assert_eq!(via_alias, via_direct);
}

#[tokio::test]
async fn unknown_name_is_not_found() {
    let storage = StubStorage { snapshot: snapshot_with_alias() };
    let factories = DriverFactoryRegistry::new();
    let cipher = test_cipher();

    let registry = ProviderRegistry::new();
    registry.reload(&storage, &factories, &cipher).await.unwrap();

    assert!(registry.resolve("nonexistent").is_err());
}

#[tokio::test]
async fn reload_eventually_closes_the_previous_driver_once_unreferenced() {
    let closed = Arc::new(AtomicUsize::new(0));
    let storage = StubStorage { snapshot: snapshot_with_alias() };
    let mut factories = DriverFactoryRegistry::new();
    factories.register(Arc::new(StubFactory { closed: closed.clone() }));
    let cipher = test_cipher();

    let registry = ProviderRegistry::new();
    registry.reload(&storage, &factories, &cipher).await.unwrap();
    // Reload again with no in-flight holders of the first driver: it should
    // be closed exactly once, promptly.
    registry.reload(&storage, &factories, &cipher).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
