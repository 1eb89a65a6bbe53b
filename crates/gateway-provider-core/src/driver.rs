use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Provider-native model name, already resolved by the registry.
    pub model: String,
    pub payload: Bytes,
    pub stream: bool,
    /// Per-1k-token pricing for the resolved model (spec.md §3 Model), so the
    /// driver can turn the upstream usage block into a reported cost without
    /// reaching back into the store.
    pub input_price_per_1k_usd_micros: i64,
    pub output_price_per_1k_usd_micros: i64,
}

pub enum ChatBody {
    Buffered(Bytes),
    Stream(std::pin::Pin<Box<dyn futures_core::Stream<Item = Result<Bytes, DriverError>> + Send>>),
}

pub struct ChatResponse {
    pub status: u16,
    pub body: ChatBody,
    pub upstream_latency_ms: u64,
    /// `None` when the provider's reply did not carry a token usage block;
    /// the caller falls back to a configured estimate.
    pub reported_cost_usd_micros: Option<i64>,
    /// Zero for streamed responses: the usage block only arrives in the
    /// final SSE chunk, and reassembling a stream to read it would defeat
    /// the point of passing it through opaquely.
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("invalid provider config: {0}")]
    InvalidConfig(String),
    #[error("missing credential field: {0}")]
    MissingCredentialField(&'static str),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("upstream timed out")]
    Timeout,
    #[error("credential validation failed: {0}")]
    InvalidCredentials(String),
}

/// Capability set every provider variant implements (spec.md §4.5/§9
/// "Interface polymorphism"): `Id`, `Type`, `Chat`, `ValidateCredentials`,
/// `Close`. Concrete types are constructed only at the factory boundary
/// keyed by `type_tag`.
#[async_trait]
pub trait Driver: Send + Sync {
    fn id(&self) -> i64;
    fn type_tag(&self) -> &str;

    async fn chat(&self, ctx: DriverContext, req: ChatRequest) -> Result<ChatResponse, DriverError>;

    async fn validate_credentials(&self, ctx: DriverContext) -> Result<(), DriverError>;

    /// Called exactly once, only after the driver has been swapped out of
    /// the live registry snapshot (spec.md §4.5).
    async fn close(&self);
}

#[derive(Debug, Clone, Default)]
pub struct DriverContext {
    pub trace_id: String,
}
