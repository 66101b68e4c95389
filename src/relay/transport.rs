//! Upstream transport seam and its reqwest implementation.
//!
//! The forwarder only sees [`UpstreamTransport`] and [`UpstreamBody`], so tests can
//! script upstream behaviour and count connection releases without a socket.

use async_trait::async_trait;
use axum::body::Bytes;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::relay::error::{error_chain, RelayError};
use crate::relay::types::{OutboundBody, OutboundRequest, UpstreamResponse};

/// Issues exactly one outbound request per call.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, RelayError>;
}

/// A live upstream response body. Dropping it releases the connection.
#[async_trait]
pub trait UpstreamBody: Send {
    /// Next chunk of the body; `Ok(None)` is a clean end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RelayError>;
}

/// Transport backed by a shared `reqwest::Client` connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &UpstreamConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if !config.system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::Construction(error_chain(&e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, RelayError> {
        let body = match request.body {
            OutboundBody::Full(bytes) => reqwest::Body::from(bytes),
            OutboundBody::Stream(body) => reqwest::Body::wrap_stream(body.into_data_stream()),
        };

        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(body)
            .send()
            .await
            .map_err(|e| RelayError::transport(&e))?;

        Ok(UpstreamResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: Box::new(ReqwestBody(response)),
        })
    }
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl UpstreamBody for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RelayError> {
        self.0.chunk().await.map_err(|e| RelayError::transport(&e))
    }
}
