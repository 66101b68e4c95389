//! Upstream forwarder: builds the outbound request, issues it, and transfers the
//! answer back in one of three ways.
//!
//! # Modes
//! - Buffered: read the whole upstream body, answer with `application/json`.
//! - Streaming: commit event-stream headers, copy chunks, flush after each write.
//! - Passthrough: mirror upstream status and headers, then copy like streaming.
//!
//! The upstream body is owned here from the moment `send` succeeds until the
//! transfer ends; it is dropped (connection released) on every exit path.

use axum::body::{Bytes, HttpBody};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::config::{StreamingConfig, UpstreamConfig};
use crate::relay::error::{RelayError, SinkError};
use crate::relay::sink::ResponseSink;
use crate::relay::transport::{UpstreamBody, UpstreamTransport};
use crate::relay::types::{
    ForwardMode, InboundRequest, OutboundBody, OutboundRequest, RelayBody, RelayResult,
    ResponseHead, StreamOutcome, StreamSummary, UpstreamResponse,
};

const EVENT_STREAM: &str = "text/event-stream";

/// Connection-scoped headers that never cross the relay.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

pub struct Forwarder {
    transport: Arc<dyn UpstreamTransport>,
    endpoint: Url,
    base_url: Url,
    sse_chunk_size: usize,
    passthrough_chunk_size: usize,
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("endpoint", &self.endpoint.as_str())
            .field("base_url", &self.base_url.as_str())
            .field("sse_chunk_size", &self.sse_chunk_size)
            .field("passthrough_chunk_size", &self.passthrough_chunk_size)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        upstream: &UpstreamConfig,
        streaming: &StreamingConfig,
    ) -> Result<Self, RelayError> {
        let endpoint = Url::parse(&upstream.endpoint).map_err(|e| {
            RelayError::Construction(format!("invalid endpoint '{}': {}", upstream.endpoint, e))
        })?;
        let base_url = Url::parse(&upstream.base_url).map_err(|e| {
            RelayError::Construction(format!("invalid base URL '{}': {}", upstream.base_url, e))
        })?;

        Ok(Self {
            transport,
            endpoint,
            base_url,
            sse_chunk_size: streaming.sse_chunk_size,
            passthrough_chunk_size: streaming.passthrough_chunk_size,
        })
    }

    /// Outbound request for the fixed JSON endpoint.
    pub fn json_request(&self, api_key: Option<&HeaderValue>, payload: Bytes, stream: bool) -> OutboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(header::AUTHORIZATION, key.clone());
        }
        if stream {
            headers.insert(header::ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        }

        OutboundRequest {
            method: Method::POST,
            url: self.endpoint.clone(),
            headers,
            body: OutboundBody::Full(payload),
        }
    }

    /// Outbound request re-targeting the inbound path onto the upstream host.
    pub fn passthrough_request(&self, inbound: InboundRequest) -> Result<OutboundRequest, RelayError> {
        let url = join_upstream(&self.base_url, &inbound.path_and_query)?;

        let mut headers = inbound.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        let body = match OutboundBody::from(inbound.body) {
            OutboundBody::Stream(body) if body.is_end_stream() => OutboundBody::Full(Bytes::new()),
            other => other,
        };

        Ok(OutboundRequest {
            method: inbound.method,
            url,
            headers,
            body,
        })
    }

    /// Issue `request` and transfer the answer according to `mode`.
    ///
    /// Errors are only returned while nothing has been committed to `sink`;
    /// failures after the commit end up in the [`StreamSummary`].
    pub async fn relay<S>(
        &self,
        mode: ForwardMode,
        request: OutboundRequest,
        sink: &mut S,
    ) -> Result<RelayResult, RelayError>
    where
        S: ResponseSink + ?Sized,
    {
        tracing::debug!(
            mode = mode.as_str(),
            method = %request.method,
            url = %request.url,
            "Forwarding to upstream"
        );

        let response = self.transport.send(request).await?;

        match mode {
            ForwardMode::Buffered => {
                let status = response.status;
                let body = read_to_end(response.body).await?;
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(RelayResult {
                    status,
                    headers,
                    body: RelayBody::Complete(body),
                })
            }
            ForwardMode::Streaming => {
                let status = response.status;
                let headers = event_stream_headers();
                let head = ResponseHead {
                    status,
                    headers: headers.clone(),
                };
                let summary = pump(mode, response.body, head, self.sse_chunk_size, sink).await;
                Ok(RelayResult {
                    status,
                    headers,
                    body: RelayBody::Streamed(summary),
                })
            }
            ForwardMode::Passthrough => {
                let UpstreamResponse {
                    status,
                    mut headers,
                    body,
                } = response;
                strip_hop_by_hop(&mut headers);
                let head = ResponseHead {
                    status,
                    headers: headers.clone(),
                };
                let summary = pump(mode, body, head, self.passthrough_chunk_size, sink).await;
                Ok(RelayResult {
                    status,
                    headers,
                    body: RelayBody::Streamed(summary),
                })
            }
        }
    }
}

/// Read an upstream body to completion, then release it.
async fn read_to_end(mut body: Box<dyn UpstreamBody>) -> Result<Bytes, RelayError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next_chunk().await? {
        buf.extend_from_slice(&chunk);
    }
    drop(body);
    tracing::trace!(bytes = buf.len(), "Upstream body buffered and released");
    Ok(Bytes::from(buf))
}

/// Commit `head` once, then copy upstream chunks into `sink` until end of
/// stream, an upstream read failure, or a failed write.
async fn pump<S>(
    mode: ForwardMode,
    mut body: Box<dyn UpstreamBody>,
    head: ResponseHead,
    chunk_size: usize,
    sink: &mut S,
) -> StreamSummary
where
    S: ResponseSink + ?Sized,
{
    let mut summary = StreamSummary {
        bytes: 0,
        chunks: 0,
        outcome: StreamOutcome::Completed,
    };

    summary.outcome = if sink.commit(head).await.is_err() {
        StreamOutcome::ClientGone
    } else {
        loop {
            let chunk = match body.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break StreamOutcome::Completed,
                Err(e) => {
                    tracing::warn!(mode = mode.as_str(), error = %e, "Upstream stream failed after commit");
                    report_failure(mode, &e, sink).await;
                    break StreamOutcome::UpstreamFailed(e.to_string());
                }
            };
            if let Err(e) = write_chunk(sink, chunk, chunk_size, &mut summary).await {
                tracing::debug!(mode = mode.as_str(), error = %e, "Client went away mid-stream");
                break StreamOutcome::ClientGone;
            }
        }
    };

    drop(body);
    tracing::trace!(mode = mode.as_str(), bytes = summary.bytes, "Upstream body released");
    summary
}

/// Write `chunk` in pieces of at most `chunk_size` bytes (0 = unbounded),
/// flushing after each piece.
async fn write_chunk<S>(
    sink: &mut S,
    mut chunk: Bytes,
    chunk_size: usize,
    summary: &mut StreamSummary,
) -> Result<(), SinkError>
where
    S: ResponseSink + ?Sized,
{
    while !chunk.is_empty() {
        let piece = if chunk_size > 0 && chunk.len() > chunk_size {
            chunk.split_to(chunk_size)
        } else {
            std::mem::take(&mut chunk)
        };
        let len = piece.len() as u64;
        sink.write(piece).await?;
        sink.flush().await?;
        summary.bytes += len;
        summary.chunks += 1;
    }
    Ok(())
}

/// Best-effort report of a failure once the status line is gone.
async fn report_failure<S>(mode: ForwardMode, error: &RelayError, sink: &mut S)
where
    S: ResponseSink + ?Sized,
{
    match mode {
        ForwardMode::Streaming => {
            let event = sse_error_event(error);
            if sink.write(event).await.is_ok() {
                let _ = sink.flush().await;
            }
        }
        _ => sink.fail(error).await,
    }
}

fn sse_error_event(error: &RelayError) -> Bytes {
    let data = serde_json::json!({
        "error": {
            "message": error.to_string(),
            "type": "relay_error",
        }
    });
    Bytes::from(format!("event: error\ndata: {}\n\n", data))
}

fn event_stream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// `base` + `path_and_query`, keeping any path prefix on `base`.
fn join_upstream(base: &Url, path_and_query: &str) -> Result<Url, RelayError> {
    let base_str = base.as_str().trim_end_matches('/');
    let target = if path_and_query.starts_with('/') {
        format!("{}{}", base_str, path_and_query)
    } else {
        format!("{}/{}", base_str, path_and_query)
    };
    Url::parse(&target)
        .map_err(|e| RelayError::Construction(format!("invalid upstream URL '{}': {}", target, e)))
}
