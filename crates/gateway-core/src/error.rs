//! HTTP-mapped failures for the request pipeline (spec.md §4.1, §7).
//!
//! Invariant: nothing past the upstream call is allowed to change the
//! response status (spec.md §7) — `ProxyError` is only ever produced by
//! stages 1 through 9.

use bytes::Bytes;
use http::StatusCode;

#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    fn new(status: StatusCode, message: impl Into<Bytes>) -> Self {
        Self { status, body: message.into() }
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_request(message: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: &'static str) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }

    pub fn over_budget() -> Self {
        Self::new(StatusCode::PAYMENT_REQUIRED, "monthly budget exceeded")
    }

    pub fn internal(message: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}
