//! Relay dispatcher: classifies an inbound request and hands it to the forwarder.

use axum::body::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::forwarder::Forwarder;
use crate::relay::sink::ResponseSink;
use crate::relay::transport::UpstreamTransport;
use crate::relay::types::{ForwardMode, InboundRequest, RelayMode, RelayResult};

/// Decide how a JSON-relay request is forwarded.
///
/// The body must be a JSON object. `"stream": true` selects streaming; any other
/// value, or no `stream` field, selects buffered.
pub fn classify(payload: &[u8]) -> Result<ForwardMode, RelayError> {
    let object: Map<String, Value> =
        serde_json::from_slice(payload).map_err(|e| RelayError::Classification(e.to_string()))?;

    match object.get("stream") {
        Some(Value::Bool(true)) => Ok(ForwardMode::Streaming),
        _ => Ok(ForwardMode::Buffered),
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    mode: RelayMode,
    forwarder: Forwarder,
    max_body_size: usize,
}

impl Dispatcher {
    pub fn new(mode: RelayMode, forwarder: Forwarder, max_body_size: usize) -> Self {
        Self {
            mode,
            forwarder,
            max_body_size,
        }
    }

    pub fn from_config(
        config: &RelayConfig,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Result<Self, RelayError> {
        let forwarder = Forwarder::new(transport, &config.upstream, &config.streaming)?;
        Ok(Self::new(
            config.upstream.mode,
            forwarder,
            config.security.max_body_size,
        ))
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    /// Run one relay operation.
    ///
    /// Buffered requests come back as a complete [`RelayResult`] and never touch
    /// `sink`. Streamed requests commit their head to `sink` and return once the
    /// body transfer has ended.
    pub async fn dispatch<S>(&self, inbound: InboundRequest, mut sink: S) -> Result<RelayResult, RelayError>
    where
        S: ResponseSink,
    {
        match self.mode {
            RelayMode::Passthrough => {
                let request = self.forwarder.passthrough_request(inbound)?;
                self.forwarder
                    .relay(ForwardMode::Passthrough, request, &mut sink)
                    .await
            }
            RelayMode::Json => {
                let api_key = inbound.api_key();
                let payload: Bytes = inbound.read_body(self.max_body_size).await?;
                let mode = classify(&payload)?;
                tracing::debug!(mode = mode.as_str(), bytes = payload.len(), "Request classified");

                let request = self.forwarder.json_request(
                    api_key.as_ref(),
                    payload,
                    mode == ForwardMode::Streaming,
                );
                self.forwarder.relay(mode, request, &mut sink).await
            }
        }
    }
}
