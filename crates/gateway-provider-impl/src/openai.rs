use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use gateway_crypto::CredentialMap;
use gateway_provider_core::{
    ChatBody, ChatRequest, ChatResponse, Driver, DriverContext, DriverError, DriverFactory,
};
use serde_json::Value as JsonValue;

use crate::cost::{extract_usage, reported_cost_usd_micros};
use crate::http_client;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiDriver {
    provider_id: i64,
    api_key: String,
    base_url: String,
    client: wreq::Client,
}

impl OpenAiDriver {
    fn new(provider_id: i64, api_key: String, base_url: String) -> Self {
        Self {
            provider_id,
            api_key,
            base_url,
            client: http_client::client_for_provider(provider_id),
        }
    }
}

#[async_trait]
impl Driver for OpenAiDriver {
    fn id(&self) -> i64 {
        self.provider_id
    }

    fn type_tag(&self) -> &str {
        "openai"
    }

    async fn chat(&self, _ctx: DriverContext, req: ChatRequest) -> Result<ChatResponse, DriverError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let started = Instant::now();
        let stream = req.stream;
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .body(req.payload.to_vec())
            .send()
            .await
            .map_err(|err| DriverError::Upstream(err.to_string()))?;

        let status = response.status().as_u16();

        // Streamed replies are passed through opaquely (spec.md §4.1
        // "opaque pass-through"); the usage block only arrives in the final
        // SSE chunk, so cost/token accounting stays at zero for this branch.
        if stream {
            let upstream_latency_ms = started.elapsed().as_millis() as u64;
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|err| DriverError::Upstream(err.to_string())));
            return Ok(ChatResponse {
                status,
                body: ChatBody::Stream(Box::pin(body)),
                upstream_latency_ms,
                reported_cost_usd_micros: None,
                prompt_tokens: 0,
                completion_tokens: 0,
            });
        }

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
        let url = format!("{}/v1/models", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| DriverError::Upstream(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DriverError::InvalidCredentials(format!(
                "credential check returned status {}",
                response.status()
            )))
        }
    }

    async fn close(&self) {}
}

pub struct OpenAiDriverFactory;

#[async_trait]
impl DriverFactory for OpenAiDriverFactory {
    fn type_tag(&self) -> &'static str {
        "openai"
    }

    async fn build(
        &self,
        provider_id: i64,
        credentials: CredentialMap,
        config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let api_key = credentials
            .get("api_key")
            .cloned()
            .ok_or(DriverError::MissingCredentialField("api_key"))?;
        let base_url = config_json
            .get("base_url")
            .and_then(JsonValue::as_str)
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string();
        Ok(Arc::new(OpenAiDriver::new(provider_id, api_key, base_url)))
    }
}
