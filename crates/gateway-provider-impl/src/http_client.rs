use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// One pooled client per provider id (spec.md §5 "connection-pooled
/// drivers"); `wreq::Client` is internally `Arc`'d, so cloning it is cheap
/// and keeps per-host keep-alive connections shared across requests.
static CLIENTS: OnceLock<Mutex<HashMap<i64, wreq::Client>>> = OnceLock::new();

pub(crate) fn client_for_provider(provider_id: i64) -> wreq::Client {
    let clients = CLIENTS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = clients.lock().expect("http client cache lock poisoned");
    guard
        .entry(provider_id)
        .or_insert_with(|| {
            wreq::Client::builder()
                .build()
                .expect("default wreq client config is always valid")
        })
        .clone()
}
