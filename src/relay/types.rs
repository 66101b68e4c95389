//! Values that flow through one relay operation.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::relay::error::RelayError;
use crate::relay::transport::UpstreamBody;

/// Deployment-wide relay behaviour, chosen once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Inspect the JSON body and relay to the fixed endpoint, buffered or streamed.
    #[default]
    Json,
    /// Forward method, path, headers and body verbatim onto the upstream host.
    Passthrough,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::Json => "json",
            RelayMode::Passthrough => "passthrough",
        }
    }
}

impl std::str::FromStr for RelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(RelayMode::Json),
            "passthrough" => Ok(RelayMode::Passthrough),
            other => Err(format!("unknown relay mode '{}' (expected json or passthrough)", other)),
        }
    }
}

/// Classification outcome for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Read the whole upstream body, then answer once.
    Buffered,
    /// Commit event-stream headers, then copy chunks as they arrive.
    Streaming,
    /// Mirror upstream status and headers, then copy chunks as they arrive.
    Passthrough,
}

impl ForwardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::Buffered => "buffered",
            ForwardMode::Streaming => "streaming",
            ForwardMode::Passthrough => "passthrough",
        }
    }
}

/// Body of an inbound request.
#[derive(Debug)]
pub enum InboundBody {
    /// Not read yet; passthrough forwards it as an opaque stream.
    Unread(Body),
    /// Already materialized.
    Buffered(Bytes),
}

/// Normalized inbound request handed over by the execution boundary.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    /// Path plus optional query, e.g. `/v1/chat/completions?x=1`.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: InboundBody,
}

impl InboundRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>, headers: HeaderMap, body: Body) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers,
            body: InboundBody::Unread(body),
        }
    }

    /// Same as [`InboundRequest::new`] with an already buffered body.
    pub fn buffered(
        method: Method,
        path_and_query: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers,
            body: InboundBody::Buffered(body.into()),
        }
    }

    /// The caller's credential, forwarded verbatim. Empty values count as absent.
    pub fn api_key(&self) -> Option<HeaderValue> {
        self.headers
            .get(header::AUTHORIZATION)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    /// Read the whole body, bounded by `limit` bytes.
    pub async fn read_body(self, limit: usize) -> Result<Bytes, RelayError> {
        match self.body {
            InboundBody::Buffered(bytes) if bytes.len() > limit => Err(RelayError::InboundBody(
                format!("body of {} bytes exceeds limit of {} bytes", bytes.len(), limit),
            )),
            InboundBody::Buffered(bytes) => Ok(bytes),
            InboundBody::Unread(body) => axum::body::to_bytes(body, limit)
                .await
                .map_err(|e| RelayError::InboundBody(e.to_string())),
        }
    }
}

/// Body of an outbound request.
#[derive(Debug)]
pub enum OutboundBody {
    Full(Bytes),
    /// Inbound body relayed unread.
    Stream(Body),
}

impl From<InboundBody> for OutboundBody {
    fn from(body: InboundBody) -> Self {
        match body {
            InboundBody::Unread(body) => OutboundBody::Stream(body),
            InboundBody::Buffered(bytes) => OutboundBody::Full(bytes),
        }
    }
}

/// Request issued to the upstream. Built fresh for every relay operation.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

/// Upstream answer. Dropping it releases the upstream connection.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Box<dyn UpstreamBody>,
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Status line and headers committed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// How a streamed transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream signalled end of stream.
    Completed,
    /// Reading from the upstream failed after the head was committed.
    UpstreamFailed(String),
    /// Writing to the client failed; the client went away.
    ClientGone,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::UpstreamFailed(_) => "upstream_failed",
            StreamOutcome::ClientGone => "client_gone",
        }
    }
}

/// Bookkeeping for a body that went straight to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub bytes: u64,
    pub chunks: u64,
    pub outcome: StreamOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBody {
    Complete(Bytes),
    Streamed(StreamSummary),
}

/// The value returned to the execution boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RelayBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_mode_parsing() {
        assert_eq!("json".parse::<RelayMode>().unwrap(), RelayMode::Json);
        assert_eq!("Passthrough".parse::<RelayMode>().unwrap(), RelayMode::Passthrough);
        assert!("sse".parse::<RelayMode>().is_err());
    }

    #[test]
    fn test_api_key_ignores_empty_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(""));
        let req = InboundRequest::buffered(Method::POST, "/", headers, "{}");
        assert!(req.api_key().is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer X"));
        let req = InboundRequest::buffered(Method::POST, "/", headers, "{}");
        assert_eq!(req.api_key().unwrap(), "Bearer X");
    }

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        let req = InboundRequest::new(Method::POST, "/", HeaderMap::new(), Body::from("0123456789"));
        assert!(matches!(req.read_body(4).await, Err(RelayError::InboundBody(_))));

        let req = InboundRequest::new(Method::POST, "/", HeaderMap::new(), Body::from("0123"));
        assert_eq!(req.read_body(4).await.unwrap(), Bytes::from_static(b"0123"));
    }
}
