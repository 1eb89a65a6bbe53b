use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::config::Region;
use aws_sdk_bedrockruntime::primitives::Blob;
use bytes::Bytes;
use gateway_crypto::CredentialMap;
use gateway_provider_core::{
    ChatBody, ChatRequest, ChatResponse, Driver, DriverContext, DriverError, DriverFactory,
};
use serde_json::Value as JsonValue;

use crate::cost::{extract_usage, reported_cost_usd_micros};

pub struct BedrockDriver {
    provider_id: i64,
    client: BedrockClient,
}

#[async_trait]
impl Driver for BedrockDriver {
    fn id(&self) -> i64 {
        self.provider_id
    }

    fn type_tag(&self) -> &str {
        "bedrock"
    }

    async fn chat(&self, _ctx: DriverContext, req: ChatRequest) -> Result<ChatResponse, DriverError> {
        let started = Instant::now();
        let output = self
            .client
            .invoke_model()
            .model_id(&req.model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(req.payload.to_vec()))
            .send()
            .await
            .map_err(|err| DriverError::Upstream(err.to_string()))?;

        let body = output.body.into_inner();
        let upstream_latency_ms = started.elapsed().as_millis() as u64;

        let usage = extract_usage(&body);
        let reported_cost_usd_micros = usage.map(|usage| {
            reported_cost_usd_micros(
                usage,
                req.input_price_per_1k_usd_micros,
                req.output_price_per_1k_usd_micros,
            )
        });

        Ok(ChatResponse {
            status: 200,
            body: ChatBody::Buffered(Bytes::from(body)),
            upstream_latency_ms,
            reported_cost_usd_micros,
            prompt_tokens: usage.map(|u| u.prompt_tokens).unwrap_or(0),
            completion_tokens: usage.map(|u| u.completion_tokens).unwrap_or(0),
        })
    }

    async fn validate_credentials(&self, _ctx: DriverContext) -> Result<(), DriverError> {
        // Bedrock has no cheap whoami call over this client; a misconfigured
        // credential surfaces on the first real `chat` call instead.
        Ok(())
    }

    async fn close(&self) {}
}

pub struct BedrockDriverFactory;

#[async_trait]
impl DriverFactory for BedrockDriverFactory {
    fn type_tag(&self) -> &'static str {
        "bedrock"
    }

    /// `region` is always required; explicit `access_key_id`/
    /// `secret_access_key` are optional and, when absent, the driver falls
    /// back to the ambient AWS credential chain (environment, instance
    /// profile, web identity, ...) via `aws_config`'s default provider.
    async fn build(
        &self,
        provider_id: i64,
        credentials: CredentialMap,
        _config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let access_key_id = credentials.get("access_key_id").cloned();
        let secret_access_key = credentials.get("secret_access_key").cloned();
        let region = credentials
            .get("region")
            .cloned()
            .ok_or(DriverError::MissingCredentialField("region"))?;
        let session_token = credentials.get("session_token").cloned();

        let config = match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let creds =
                    Credentials::new(access_key_id, secret_access_key, session_token, None, "gateway-provider-impl");
                aws_sdk_bedrockruntime::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .credentials_provider(creds)
                    .build()
            }
            _ => {
                let shared_config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .load()
                    .await;
                aws_sdk_bedrockruntime::Config::new(&shared_config)
            }
        };
        let client = BedrockClient::from_conf(config);

        Ok(Arc::new(BedrockDriver { provider_id, client }))
    }
}
