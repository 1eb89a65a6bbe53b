//! `/admin/*` CRUD surface, guarded by a bearer-JWT middleware (spec.md §6).
//!
//! Any mutation here invalidates the affected API-key cache entry; provider
//! or model mutations additionally trigger an out-of-band registry reload so
//! the effect is visible on the very next request.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, patch, post};
use axum::{Json, extract::Request};
use gateway_core::GatewayState;
use gateway_crypto::CredentialCipher;
use gateway_provider_core::DriverFactoryRegistry;
use gateway_store::{ApiKeyPatch, ApiKeyRow, NewApiKeyInput};
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use time::serde::rfc3339;
use tracing::warn;

#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<GatewayState>,
    pub admin_jwt_secret: String,
    pub factories: Arc<DriverFactoryRegistry>,
    pub cipher: Arc<CredentialCipher>,
}

pub fn admin_router(
    gateway: Arc<GatewayState>,
    admin_jwt_secret: String,
    factories: Arc<DriverFactoryRegistry>,
    cipher: Arc<CredentialCipher>,
) -> Router {
    let state = AdminState { gateway, admin_jwt_secret, factories, cipher };

    Router::new()
        .route("/keys", post(create_key))
        .route("/keys/{id}", patch(patch_key).delete(delete_key))
        .route("/providers/reload", post(reload_providers))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AdminClaims {
    #[allow(dead_code)]
    sub: String,
    exp: i64,
}

async fn admin_auth(State(state): State<AdminState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let key = DecodingKey::from_secret(state.admin_jwt_secret.as_bytes());
    jsonwebtoken::decode::<AdminClaims>(token, &key, &Validation::default())
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

#[derive(Debug, Deserialize)]
struct CreateKeyRequest {
    name: String,
    secret_hash: String,
    #[serde(default)]
    allowed_models: Vec<String>,
    #[serde(default)]
    rate_limit_per_minute: u32,
    #[serde(default)]
    monthly_budget_usd_micros: Option<i64>,
    #[serde(default, with = "rfc3339::option")]
    expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    tags: JsonValue,
}

#[derive(Debug, Serialize)]
struct ApiKeyResponse {
    id: i64,
    name: String,
    allowed_models: Vec<String>,
    rate_limit_per_minute: u32,
    monthly_budget_usd_micros: Option<i64>,
    enabled: bool,
    tags: JsonValue,
}

impl From<ApiKeyRow> for ApiKeyResponse {
    fn from(row: ApiKeyRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            allowed_models: row.allowed_models,
            rate_limit_per_minute: row.rate_limit_per_minute,
            monthly_budget_usd_micros: row.monthly_budget_usd_micros,
            enabled: row.enabled,
            tags: row.tags,
        }
    }
}

async fn create_key(State(state): State<AdminState>, Json(req): Json<CreateKeyRequest>) -> Response {
    let input = NewApiKeyInput {
        name: req.name,
        secret_hash: req.secret_hash,
        allowed_models: req.allowed_models,
        rate_limit_per_minute: req.rate_limit_per_minute,
        monthly_budget_usd_micros: req.monthly_budget_usd_micros,
        expires_at: req.expires_at,
        tags: req.tags,
    };
    match state.gateway.storage.insert_api_key(input).await {
        Ok(row) => (StatusCode::CREATED, Json(ApiKeyResponse::from(row))).into_response(),
        Err(err) => storage_error_response(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct PatchKeyRequest {
    name: Option<String>,
    allowed_models: Option<Vec<String>>,
    rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    monthly_budget_usd_micros: Option<Option<i64>>,
    enabled: Option<bool>,
    /// `null` clears the expiry, a missing key leaves it untouched, an
    /// rfc3339 string sets it.
    #[serde(default)]
    expires_at: Option<Option<String>>,
    tags: Option<JsonValue>,
}

async fn patch_key(State(state): State<AdminState>, Path(id): Path<i64>, Json(req): Json<PatchKeyRequest>) -> Response {
    let expires_at = match req.expires_at {
        Some(Some(raw)) => match OffsetDateTime::parse(&raw, &time::format_description::well_known::Rfc3339) {
            Ok(parsed) => Some(Some(parsed)),
            Err(err) => return (StatusCode::BAD_REQUEST, format!("invalid expires_at: {err}")).into_response(),
        },
        Some(None) => Some(None),
        None => None,
    };
    let patch = ApiKeyPatch {
        name: req.name,
        allowed_models: req.allowed_models,
        rate_limit_per_minute: req.rate_limit_per_minute,
        monthly_budget_usd_micros: req.monthly_budget_usd_micros,
        enabled: req.enabled,
        expires_at,
        tags: req.tags,
    };
    match state.gateway.storage.patch_api_key(id, patch).await {
        Ok(row) => {
            state.gateway.api_key_cache.delete(&row.secret_hash);
            (StatusCode::OK, Json(ApiKeyResponse::from(row))).into_response()
        }
        Err(err) => storage_error_response(err),
    }
}

// `Storage` keys deletion by id, not by secret hash, so the cache entry for
// a deleted key (if any) is reaped by the TTL sweeper rather than evicted
// here immediately.
async fn delete_key(State(state): State<AdminState>, Path(id): Path<i64>) -> Response {
    match state.gateway.storage.delete_api_key(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => storage_error_response(err),
    }
}

/// Forces an out-of-band registry reload, independent of the configured
/// periodic cadence (spec.md §6 "forces an out-of-band registry reload").
async fn reload_providers(State(state): State<AdminState>) -> Response {
    match state.gateway.registry.reload(state.gateway.storage.as_ref(), &state.factories, &state.cipher).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            warn!(event = "admin_reload_failed", error = %err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn storage_error_response(err: gateway_store::StorageError) -> Response {
    match err {
        gateway_store::StorageError::NotFound => StatusCode::NOT_FOUND.into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}
