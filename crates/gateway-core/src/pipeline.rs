//! Stage-by-stage orchestration of one proxied chat request (spec.md §4.1).
//!
//! Stages 1-9 can short-circuit with a `ProxyError`; stage 10
//! (post-processing) only runs once the upstream call has been attempted,
//! and nothing in it is allowed to change the status already decided by the
//! upstream response (spec.md §7).

use std::time::Instant;

use bytes::Bytes;
use gateway_provider_core::{ChatRequest, ChatResponse, DriverContext, ResolveError};
use gateway_store::{ApiKeyRow, UsageRecordInput};
use gateway_telemetry::{BillingUpdate, LogRecord};
use http::{HeaderMap, Method};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::auth;
use crate::classify::{self, ClassifiedRequest};
use crate::error::ProxyError;
use crate::state::GatewayState;

/// Runs stages 1 through 10 for one `POST /v1/chat/completions` call.
pub async fn handle_chat_completion(
    state: &GatewayState,
    method: &Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ChatResponse, ProxyError> {
    let request_id = Uuid::new_v4().to_string();
    let request_started = Instant::now();

    if method != Method::POST {
        return Err(ProxyError::method_not_allowed());
    }

    let api_key = auth::authenticate(&state.storage, &state.api_key_cache, headers).await?;

    let ClassifiedRequest { body: parsed_body, model: requested_model, stream } = classify::classify(&body)?;

    authorize_model(&api_key, &requested_model)?;

    let decision = state
        .rate_limiter
        .check(&api_key.id.to_string(), api_key.rate_limit_per_minute)
        .await
        .map_err(|err| ProxyError::internal(err.to_string()))?;
    if !decision.allowed {
        return Err(ProxyError::rate_limited());
    }

    let now = OffsetDateTime::now_utc();
    if !state.budget.within_budget(api_key.id, api_key.monthly_budget_usd_micros, now).await {
        return Err(ProxyError::over_budget());
    }

    let (driver, native_model, pricing) = state.registry.resolve(&requested_model).map_err(|err| match err {
        ResolveError::NotFound(name) => ProxyError::bad_request(format!("unknown model or alias: {name}")),
        ResolveError::StaleProvider => ProxyError::bad_gateway("provider unavailable during reload"),
    })?;

    let payload = serde_json::to_vec(&parsed_body).map_err(|err| ProxyError::internal(err.to_string()))?;
    let req = ChatRequest {
        model: native_model.clone(),
        payload: Bytes::from(payload),
        stream,
        input_price_per_1k_usd_micros: pricing.input_price_per_1k_usd_micros,
        output_price_per_1k_usd_micros: pricing.output_price_per_1k_usd_micros,
    };
    let ctx = DriverContext { trace_id: request_id.clone() };
    let provider_tag = driver.type_tag().to_string();

    let alias = (requested_model != native_model).then_some(requested_model.as_str());
    let started = Instant::now();

    let outcome = tokio::time::timeout(state.provider_request_timeout, driver.chat(ctx, req)).await;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            record_outcome(
                state,
                &request_id,
                &api_key,
                &provider_tag,
                &native_model,
                alias,
                0,
                request_started.elapsed().as_millis() as u64,
                None,
                Some(err.to_string()),
                None,
            );
            return Err(ProxyError::bad_gateway(err.to_string()));
        }
        Err(_) => {
            record_outcome(
                state,
                &request_id,
                &api_key,
                &provider_tag,
                &native_model,
                alias,
                started.elapsed().as_millis() as u64,
                request_started.elapsed().as_millis() as u64,
                None,
                Some("upstream timed out".to_string()),
                None,
            );
            return Err(ProxyError::bad_gateway("upstream timed out"));
        }
    };

    let usage_record = (response.status < 400).then(|| UsageRecordInput {
        api_key_id: api_key.id,
        model_id: pricing.model_id,
        provider_id: driver.id(),
        requested_at: now,
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
        total_tokens: response.prompt_tokens + response.completion_tokens,
        cost_usd_micros: response.reported_cost_usd_micros.unwrap_or(0),
        request_summary: None,
        response_summary: None,
    });

    record_outcome(
        state,
        &request_id,
        &api_key,
        &provider_tag,
        &native_model,
        alias,
        response.upstream_latency_ms,
        request_started.elapsed().as_millis() as u64,
        response.reported_cost_usd_micros,
        None,
        usage_record,
    );

    Ok(response)
}

/// Stage 5: empty `allowed_models` permits everything (spec.md §8 boundary).
fn authorize_model(api_key: &ApiKeyRow, model: &str) -> Result<(), ProxyError> {
    if api_key.allowed_models.is_empty() || api_key.allowed_models.iter().any(|m| m == model) {
        Ok(())
    } else {
        Err(ProxyError::forbidden("model not permitted for this api key"))
    }
}

/// Stage 10: always builds and enqueues a log record; budget increment and
/// the durable usage-record write are both best-effort and never feed back
/// into the HTTP response (spec.md §4.1 step 10, §7).
#[allow(clippy::too_many_arguments)]
fn record_outcome(
    state: &GatewayState,
    request_id: &str,
    api_key: &ApiKeyRow,
    provider: &str,
    model: &str,
    alias: Option<&str>,
    provider_ms: u64,
    gateway_ms: u64,
    reported_cost_usd_micros: Option<i64>,
    error: Option<String>,
    usage_record: Option<UsageRecordInput>,
) {
    let now = OffsetDateTime::now_utc();
    let cost_usd_micros = reported_cost_usd_micros.unwrap_or(0);

    let record = LogRecord {
        timestamp: now,
        request_id: request_id.to_string(),
        api_key_id: api_key.id,
        api_key_name: api_key.name.clone(),
        provider: provider.to_string(),
        model: model.to_string(),
        alias: alias.map(str::to_string),
        tags: api_key.tags.clone(),
        provider_ms,
        gateway_ms,
        cost_usd: cost_usd_micros as f64 / 1_000_000.0,
        error,
        request_payload: None,
        response_payload: None,
    };
    state.telemetry.enqueue_log(record);

    if let Some(delta) = reported_cost_usd_micros {
        let update = BillingUpdate { api_key_id: api_key.id, delta_usd_micros: delta, recorded_at: now };
        if state.telemetry.enqueue_billing(update).is_err() {
            warn!(event = "billing_queue_full", api_key_id = api_key.id, request_id);
        }
    }

    if let Some(record) = usage_record {
        let storage = state.storage.clone();
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = storage.append_usage_record(record).await {
                warn!(event = "usage_record_write_failed", error = %err, request_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_models(models: Vec<&str>) -> ApiKeyRow {
        ApiKeyRow {
            id: 1,
            name: "acme".into(),
            secret_hash: "hash".into(),
            allowed_models: models.into_iter().map(str::to_string).collect(),
            rate_limit_per_minute: 0,
            monthly_budget_usd_micros: None,
            enabled: true,
            expires_at: None,
            tags: serde_json::json!({}),
        }
    }

    #[test]
    fn empty_allowed_models_permits_anything() {
        let key = key_with_models(vec![]);
        assert!(authorize_model(&key, "gpt-4o").is_ok());
    }

    #[test]
    fn non_empty_allowed_models_rejects_unlisted() {
        let key = key_with_models(vec!["gpt-4o"]);
        assert!(authorize_model(&key, "claude-3").is_err());
        assert!(authorize_model(&key, "gpt-4o").is_ok());
    }
}
