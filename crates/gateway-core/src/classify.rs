//! Stage 4: loose JSON decode of the request body (spec.md §4.1 step 4).

use bytes::Bytes;
use serde_json::Value as JsonValue;

use crate::error::ProxyError;

pub struct ClassifiedRequest {
    pub body: JsonValue,
    pub model: String,
    pub stream: bool,
}

/// Parses `body` as a JSON object and extracts its required `model` field.
pub fn classify(body: &Bytes) -> Result<ClassifiedRequest, ProxyError> {
    let value: JsonValue =
        serde_json::from_slice(body).map_err(|_| ProxyError::bad_request("malformed request body"))?;

    let JsonValue::Object(_) = &value else {
        return Err(ProxyError::bad_request("request body must be a JSON object"));
    };

    let model = value
        .get("model")
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProxyError::bad_request("missing or empty \"model\" field"))?
        .to_string();

    let stream = value.get("stream").and_then(JsonValue::as_bool).unwrap_or(false);

    Ok(ClassifiedRequest { body: value, model, stream })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_model_field() {
        let body = Bytes::from_static(br#"{"model":"gpt-4o","messages":[]}"#);
        let classified = classify(&body).unwrap();
        assert_eq!(classified.model, "gpt-4o");
    }

    #[test]
    fn rejects_malformed_json() {
        let body = Bytes::from_static(b"not json");
        assert!(classify(&body).is_err());
    }

    #[test]
    fn rejects_a_missing_model_field() {
        let body = Bytes::from_static(br#"{"messages":[]}"#);
        assert!(classify(&body).is_err());
    }

    #[test]
    fn rejects_an_empty_model_field() {
        let body = Bytes::from_static(br#"{"model":""}"#);
        assert!(classify(&body).is_err());
    }

    #[test]
    fn rejects_a_non_object_body() {
        let body = Bytes::from_static(br#"["model","gpt-4o"]"#);
        assert!(classify(&body).is_err());
    }
}
