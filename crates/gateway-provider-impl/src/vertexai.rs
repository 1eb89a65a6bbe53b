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

/// Talks to Vertex AI's OpenAI-compatible `chat/completions` endpoint
/// (`{location}-aiplatform.googleapis.com/.../endpoints/openapi/chat/completions`),
/// authenticating with a short-lived OAuth access token. Token refresh is
/// out of scope here: the registry reload cadence (default 5 min) re-reads
/// `providers.credential_blob`, so an operator rotating the stored token is
/// how this driver picks up a fresh one.
pub struct VertexAiDriver {
    provider_id: i64,
    access_token: String,
    endpoint_url: String,
    client: wreq::Client,
}

#[async_trait]
impl Driver for VertexAiDriver {
    fn id(&self) -> i64 {
        self.provider_id
    }

    fn type_tag(&self) -> &str {
        "vertexai"
    }

    async fn chat(&self, _ctx: DriverContext, req: ChatRequest) -> Result<ChatResponse, DriverError> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint_url)
            .bearer_auth(&self.access_token)
            .header("content-type", "application/json")
            .body(req.payload.to_vec())
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
        if self.access_token.is_empty() {
            return Err(DriverError::InvalidCredentials("empty access token".into()));
        }
        Ok(())
    }

    async fn close(&self) {}
}

pub struct VertexAiDriverFactory;

#[async_trait]
impl DriverFactory for VertexAiDriverFactory {
    fn type_tag(&self) -> &'static str {
        "vertexai"
    }

    async fn build(
        &self,
        provider_id: i64,
        credentials: CredentialMap,
        config_json: &JsonValue,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        let access_token = credentials
            .get("access_token")
            .cloned()
            .ok_or(DriverError::MissingCredentialField("access_token"))?;
        let project_id = config_json
            .get("project_id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DriverError::InvalidConfig("vertexai provider requires config.project_id".into()))?;
        let location = config_json
            .get("location")
            .and_then(JsonValue::as_str)
            .unwrap_or("us-central1");
        let endpoint_url = format!(
            "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/endpoints/openapi/chat/completions"
        );

        Ok(Arc::new(VertexAiDriver {
            provider_id,
            access_token,
            endpoint_url,
            client: http_client::client_for_provider(provider_id),
        }))
    }
}
