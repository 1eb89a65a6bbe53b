//! The log queue's payload shape (spec.md §4.6, §6 "Object-storage layout").

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use time::serde::rfc3339;

/// Superset of a usage record with timing, alias, tags, and error detail —
/// dispatched to the log queue on every request, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(with = "rfc3339")]
    pub timestamp: OffsetDateTime,
    pub request_id: String,
    pub api_key_id: i64,
    pub api_key_name: String,
    pub provider: String,
    pub model: String,
    pub alias: Option<String>,
    pub tags: JsonValue,
    pub provider_ms: u64,
    pub gateway_ms: u64,
    pub cost_usd: f64,
    pub error: Option<String>,
    pub request_payload: Option<JsonValue>,
    pub response_payload: Option<JsonValue>,
}

impl LogRecord {
    /// One ndjson line, no trailing newline.
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord {
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            request_id: "req-1".into(),
            api_key_id: 42,
            api_key_name: "acme-prod".into(),
            provider: "openai-main".into(),
            model: "gpt-4o".into(),
            alias: Some("proj-gpt".into()),
            tags: serde_json::json!({"team": "checkout"}),
            provider_ms: 812,
            gateway_ms: 820,
            cost_usd: 0.0123,
            error: None,
            request_payload: Some(serde_json::json!({"model": "proj-gpt"})),
            response_payload: None,
        }
    }

    #[test]
    fn round_trips_through_ndjson() {
        let record = sample();
        let line = record.to_ndjson_line().unwrap();
        assert!(!line.contains('\n'));
        let back: LogRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.request_id, record.request_id);
        assert_eq!(back.alias, record.alias);
        assert_eq!(back.cost_usd, record.cost_usd);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let line = sample().to_ndjson_line().unwrap();
        assert!(line.contains("2023-11-14T22:13:20Z"));
    }
}
