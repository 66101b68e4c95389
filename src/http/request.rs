//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every inbound request
//! - Normalize the axum request into the relay's `InboundRequest`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is handed over unread; only the dispatcher decides whether to read it

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::relay::InboundRequest;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Assigns `x-request-id: <uuid v4>` to requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayRequestId;

impl MakeRequestId for RelayRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID, or `unknown` when none is attached.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Convert an axum request into the relay's inbound representation.
pub fn inbound_from_request(request: Request<Body>) -> InboundRequest {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    InboundRequest::new(parts.method, path_and_query, parts.headers, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Method};

    #[test]
    fn test_inbound_keeps_path_query_and_headers() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("http://relay.local/v1/chat/completions?debug=1")
            .header(header::AUTHORIZATION, "Bearer X")
            .header("x-multi", "a")
            .header("x-multi", "b")
            .body(Body::from("{}"))
            .unwrap();

        let inbound = inbound_from_request(request);
        assert_eq!(inbound.method, Method::POST);
        assert_eq!(inbound.path_and_query, "/v1/chat/completions?debug=1");
        assert_eq!(inbound.api_key().unwrap(), "Bearer X");
        assert_eq!(inbound.headers.get_all("x-multi").iter().count(), 2);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let request = Request::new(());
        let mut maker = RelayRequestId;
        let a = maker.make_request_id(&request).unwrap();
        let b = maker.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }

    #[test]
    fn test_request_id_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        assert_eq!(request_id(&headers), "abc");
    }
}
