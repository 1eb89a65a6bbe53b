use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_crypto::CredentialMap;
use serde_json::Value as JsonValue;

use crate::driver::{Driver, DriverError};

/// Builds a live `Driver` for one provider row. Implemented once per
/// `type_tag` ("openai", "vertexai", "bedrock", "custom", ...) and
/// registered into a `DriverFactoryRegistry` at bootstrap (spec.md §9
/// "concrete types are constructed only at the factory boundary keyed by a
/// string type tag"). `build` is async because some variants (Bedrock's
/// ambient-credential fallback) need to reach an external credential
/// provider before a driver can be constructed.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    fn type_tag(&self) -> &'static str;

    async fn build(
        &self,
        provider_id: i64,
        credentials: CredentialMap,
        config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError>;
}

#[derive(Default)]
pub struct DriverFactoryRegistry {
    factories: HashMap<&'static str, Arc<dyn DriverFactory>>,
}

impl DriverFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn DriverFactory>) {
        self.factories.insert(factory.type_tag(), factory);
    }

    pub async fn build(
        &self,
        type_tag: &str,
        provider_id: i64,
        credentials: CredentialMap,
        config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let factory = self.factories.get(type_tag).ok_or_else(|| {
            DriverError::InvalidConfig(format!("no driver factory registered for type {type_tag}"))
        })?;
        factory.build(provider_id, credentials, config_json).await
    }
}
