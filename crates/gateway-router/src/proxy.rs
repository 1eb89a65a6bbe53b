//! The public proxy surface: `POST /v1/chat/completions`, `GET /health`,
//! `GET /metrics` (spec.md §6).

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request as AxumRequest, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::StreamExt;
use gateway_core::GatewayState;
use gateway_core::error::ProxyError;
use gateway_provider_core::{ChatBody, ChatResponse};

#[derive(Clone)]
pub struct ProxyRouterState {
    pub gateway: Arc<GatewayState>,
}

pub fn proxy_router(gateway: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(ProxyRouterState { gateway })
}

async fn health() -> &'static str {
    "ok"
}

/// Fixed-format Prometheus exposition text (spec.md §6 "Prometheus exposition
/// details" is out of scope for the core pipeline; this is the minimal
/// counter the pipeline itself is responsible for).
async fn metrics(State(state): State<ProxyRouterState>) -> String {
    format!("gateway_telemetry_log_queue_depth {}\n", state.gateway.telemetry.queued_log_count())
}

async fn chat_completions(State(state): State<ProxyRouterState>, req: AxumRequest<Body>) -> Response {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => return proxy_error_into_axum(ProxyError::bad_request(err.to_string())),
    };

    match gateway_core::handle_chat_completion(&state.gateway, &method, &headers, body).await {
        Ok(response) => chat_response_into_axum(response),
        Err(err) => proxy_error_into_axum(err),
    }
}

pub fn proxy_error_into_axum(err: ProxyError) -> Response {
    Response::builder()
        .status(err.status)
        .body(Body::from(err.body))
        .unwrap_or_else(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn chat_response_into_axum(response: ChatResponse) -> Response {
    let status =
        axum::http::StatusCode::from_u16(response.status).unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
    let body = match response.body {
        ChatBody::Buffered(bytes) => Body::from(bytes),
        ChatBody::Stream(stream) => {
            let mapped = stream.map(|chunk| chunk.map_err(|err| std::io::Error::other(err.to_string())));
            Body::from_stream(mapped)
        }
    };
    Response::builder().status(status).body(body).unwrap_or_else(|_| {
        proxy_error_into_axum(ProxyError::internal("failed to build upstream response"))
    })
}
