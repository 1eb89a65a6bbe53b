use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use gateway_crypto::CredentialMap;
use gateway_provider_core::{
    ChatBody, ChatRequest, ChatResponse, Driver, DriverContext, DriverError, DriverFactory,
};
use serde_json::Value as JsonValue;

use crate::cost::{extract_usage, reported_cost_usd_micros};
use crate::http_client;

/// Third-party providers that speak the OpenAI chat-completions wire format
/// (spec.md §4.5 "extensible variants"; grounded in the teacher's
/// `providers::custom` module, which exists for the same reason: a single
/// driver shape reused across many OpenAI-compatible endpoints).
pub struct CustomDriver {
    provider_id: i64,
    api_key: Option<String>,
    chat_path: String,
    base_url: String,
    client: wreq::Client,
}

#[async_trait]
impl Driver for CustomDriver {
    fn id(&self) -> i64 {
        self.provider_id
    }

    fn type_tag(&self) -> &str {
        "custom"
    }

    async fn chat(&self, _ctx: DriverContext, req: ChatRequest) -> Result<ChatResponse, DriverError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.chat_path.trim_start_matches('/')
        );
        let started = Instant::now();
        let mut builder = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(req.payload.to_vec());
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|err| DriverError::Upstream(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| DriverError::Upstream(err.to_string()))?;
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
            status,
            body: ChatBody::Buffered(Bytes::from(body.to_vec())),
            upstream_latency_ms,
            reported_cost_usd_micros,
            prompt_tokens: usage.map(|u| u.prompt_tokens).unwrap_or(0),
            completion_tokens: usage.map(|u| u.completion_tokens).unwrap_or(0),
        })
    }

    async fn validate_credentials(&self, _ctx: DriverContext) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) {}
}

pub struct CustomDriverFactory;

#[async_trait]
impl DriverFactory for CustomDriverFactory {
    fn type_tag(&self) -> &'static str {
        "custom"
    }

    async fn build(
        &self,
        provider_id: i64,
        credentials: CredentialMap,
        config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let base_url = config_json
            .get("base_url")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DriverError::InvalidConfig("custom provider requires config.base_url".into()))?
            .to_string();
        let chat_path = config_json
            .get("chat_path")
            .and_then(JsonValue::as_str)
            .unwrap_or("/v1/chat/completions")
            .to_string();
        Ok(Arc::new(CustomDriver {
            provider_id,
            api_key: credentials.get("api_key").cloned(),
            chat_path,
            base_url,
            client: http_client::client_for_provider(provider_id),
        }))
    }
}
