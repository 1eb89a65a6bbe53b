pub mod bedrock;
pub mod cost;
pub mod custom;
mod http_client;
pub mod openai;
pub mod vertexai;

use gateway_provider_core::DriverFactoryRegistry;

/// Registers every concrete driver factory this binary ships with (spec.md
/// §4.5 "extensible variants"). Additional `type_tag`s can be registered by
/// callers without touching this crate.
pub fn register_all(registry: &mut DriverFactoryRegistry) {
    use std::sync::Arc;
    registry.register(Arc::new(openai::OpenAiDriverFactory));
    registry.register(Arc::new(vertexai::VertexAiDriverFactory));
    registry.register(Arc::new(bedrock::BedrockDriverFactory));
    registry.register(Arc::new(custom::CustomDriverFactory));
}
