//! Request instrumentation applied to every served router.
//!
//! # Responsibilities
//! - Generate a UUID v4 request id when the client sent none
//! - Echo the id back on the response
//! - Trace each request and bound it with an optional timeout
//!
//! # Design Decisions
//! - Request ID added as early as possible so the trace span carries it
//! - Header name is `x-request-id` in both directions

use std::time::Duration;

use axum::http::{HeaderValue, Request};
use axum::Router;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id generator backed by random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Wrap `router` with request id, tracing and timeout layers.
///
/// Layers run outermost first: set id → trace → propagate id → timeout → router.
#[allow(deprecated)]
pub fn instrument(router: Router, request_timeout: Option<Duration>) -> Router {
    let router = match request_timeout {
        Some(timeout) => router.layer(TimeoutLayer::new(timeout)),
        None => router,
    };
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_uuids() {
        let request = Request::new(());
        let mut make = MakeRequestUuidV4;
        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();

        let a = a.header_value().to_str().unwrap();
        let b = b.header_value().to_str().unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a).is_ok());
    }
}
