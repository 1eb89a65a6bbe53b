//! Bulk flush of a log batch to object storage (spec.md §4.6 "Log flush",
//! §6 "Object-storage layout").

use std::io::Write;

use object_store::path::Path as ObjectPath;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use time::OffsetDateTime;

use crate::record::LogRecord;

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("serializing log batch: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("gzip encoding log batch: {0}")]
    Gzip(std::io::Error),
    #[error("object store put failed: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Builds the time-partitioned key `<prefix>/<YYYY>/<MM>/<DD>/<pod-id>-<epoch>-<nanos>.jsonl[.gz]`.
pub fn partition_key(prefix: &str, pod_id: &str, now: OffsetDateTime, gzip: bool) -> ObjectPath {
    let ext = if gzip { "jsonl.gz" } else { "jsonl" };
    let path = format!(
        "{prefix}/{:04}/{:02}/{:02}/{pod_id}-{}-{}.{ext}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.unix_timestamp(),
        now.nanosecond(),
    );
    ObjectPath::from(path)
}

fn ndjson_body(records: &[LogRecord]) -> Result<Vec<u8>, FlushError> {
    let mut body = Vec::new();
    for record in records {
        body.extend_from_slice(record.to_ndjson_line()?.as_bytes());
        body.push(b'\n');
    }
    Ok(body)
}

fn gzip_encode(body: &[u8]) -> Result<Vec<u8>, FlushError> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(body).map_err(FlushError::Gzip)?;
    encoder.finish().map_err(FlushError::Gzip)
}

/// Writes one batch as a single object. Compression, when enabled, covers
/// the whole ndjson payload end-to-end (spec.md §4.6).
pub async fn write_log_batch(
    store: &dyn ObjectStore,
    prefix: &str,
    pod_id: &str,
    records: &[LogRecord],
    gzip: bool,
    now: OffsetDateTime,
) -> Result<ObjectPath, FlushError> {
    let body = ndjson_body(records)?;
    let body = if gzip { gzip_encode(&body)? } else { body };
    let path = partition_key(prefix, pod_id, now, gzip);

    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, AttributeValue::from("application/x-ndjson"));
    if gzip {
        attributes.insert(Attribute::ContentEncoding, AttributeValue::from("gzip"));
    }
    let options = PutOptions::from(attributes);

    store.put_opts(&path, PutPayload::from(body), options).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_key_is_zero_padded_and_extension_matches_gzip() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let plain = partition_key("logs", "pod-a", now, false);
        assert_eq!(plain.as_ref(), "logs/2023/11/14/pod-a-1700000000-0.jsonl");

        let gz = partition_key("logs", "pod-a", now, true);
        assert!(gz.as_ref().ends_with(".jsonl.gz"));
    }

    #[tokio::test]
    async fn writes_an_object_with_one_line_per_record() {
        let store = object_store::memory::InMemory::new();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let record = LogRecord {
            timestamp: now,
            request_id: "req-1".into(),
            api_key_id: 1,
            api_key_name: "k".into(),
            provider: "openai-main".into(),
            model: "gpt-4o".into(),
            alias: None,
            tags: serde_json::json!({}),
            provider_ms: 1,
            gateway_ms: 2,
            cost_usd: 0.0,
            error: None,
            request_payload: None,
            response_payload: None,
        };

        let path = write_log_batch(&store, "logs", "pod-a", &[record.clone(), record], false, now)
            .await
            .unwrap();
        let fetched = store.get(&path).await.unwrap().bytes().await.unwrap();
        let body = String::from_utf8(fetched.to_vec()).unwrap();
        assert_eq!(body.lines().count(), 2);
    }
}
