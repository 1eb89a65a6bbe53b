//! Stage 2/3 of the pipeline: bearer extraction, SHA-256 hashing, and the
//! cache-aside key lookup (spec.md §4.1 steps 2-3).

use std::sync::Arc;
use std::time::Duration;

use gateway_cache::LruTtlCache;
use gateway_store::{ApiKeyRow, Storage, StorageError};
use http::HeaderMap;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::ProxyError;

pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, ProxyError> {
    let value = headers
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| ProxyError::unauthorized("unauthorized"))?
        .to_str()
        .map_err(|_| ProxyError::unauthorized("unauthorized"))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or_else(|| ProxyError::unauthorized("unauthorized"))?;

    if token.is_empty() {
        return Err(ProxyError::unauthorized("unauthorized"));
    }
    Ok(token)
}

pub fn hash_bearer(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").unwrap();
    }
    out
}

/// Cache-aside lookup of the API key by bearer hash (spec.md §4.1 step 3).
/// 500 on any storage failure; 401 for missing, disabled, expired, or
/// revoked keys.
pub async fn authenticate(
    storage: &Arc<dyn Storage>,
    cache: &LruTtlCache<String, ApiKeyRow>,
    headers: &HeaderMap,
) -> Result<ApiKeyRow, ProxyError> {
    let token = extract_bearer(headers)?;
    let hash = hash_bearer(token);

    let row = match cache.get(&hash) {
        Some(row) => row,
        None => {
            let row = storage.get_api_key_by_secret_hash(&hash).await.map_err(|err| match err {
                StorageError::NotFound => ProxyError::unauthorized("unknown api key"),
                other => ProxyError::internal(other.to_string()),
            })?;
            let row = row.ok_or_else(|| ProxyError::unauthorized("unknown api key"))?;
            cache.set(hash, row.clone());
            row
        }
    };

    if !is_usable(&row, OffsetDateTime::now_utc()) {
        return Err(ProxyError::unauthorized("api key disabled or expired"));
    }
    Ok(row)
}

fn is_usable(row: &ApiKeyRow, now: OffsetDateTime) -> bool {
    if !row.enabled {
        return false;
    }
    match row.expires_at {
        Some(expires_at) => expires_at > now,
        None => true,
    }
}

/// Default TTL applied to cached API-key rows (spec.md §6 `CACHE_API_KEY_TTL`).
pub const DEFAULT_API_KEY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    fn row(enabled: bool, expires_at: Option<OffsetDateTime>) -> ApiKeyRow {
        ApiKeyRow {
            id: 1,
            name: "acme".into(),
            secret_hash: hash_bearer("sk-test"),
            allowed_models: Vec::new(),
            rate_limit_per_minute: 0,
            monthly_budget_usd_micros: None,
            enabled,
            expires_at,
            tags: serde_json::json!({}),
        }
    }

    #[test]
    fn disabled_key_is_not_usable() {
        assert!(!is_usable(&row(false, None), OffsetDateTime::now_utc()));
    }

    #[test]
    fn expired_key_is_not_usable() {
        let past = OffsetDateTime::from_unix_timestamp(0).unwrap();
        assert!(!is_usable(&row(true, Some(past)), OffsetDateTime::now_utc()));
    }

    #[test]
    fn enabled_unexpired_key_is_usable() {
        assert!(is_usable(&row(true, None), OffsetDateTime::now_utc()));
    }

    #[test]
    fn extract_bearer_rejects_missing_and_malformed_headers() {
        let headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert!(extract_bearer(&headers).is_err());
    }

    #[test]
    fn extract_bearer_accepts_a_well_formed_token() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Bearer sk-live-abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "sk-live-abc");
    }

    #[test]
    fn hash_is_deterministic_and_sixty_four_hex_chars() {
        let hash = hash_bearer("sk-test");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_bearer("sk-test"));
    }
}
