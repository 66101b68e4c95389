//! Relay error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that end a relay operation before a response head reached the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The outbound request could not be built (bad URL, method or header value).
    #[error("failed to build upstream request: {0}")]
    Construction(String),

    /// Connecting to, or reading from, the upstream failed.
    #[error("{0}")]
    Transport(String),

    /// The inbound body is not a JSON object, so the request cannot be classified.
    #[error("request body is not a JSON object: {0}")]
    Classification(String),

    /// The inbound body could not be read (client error or size limit).
    #[error("failed to read request body: {0}")]
    InboundBody(String),
}

impl RelayError {
    /// Status code of the terminal response carrying this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InboundBody(_) => StatusCode::BAD_REQUEST,
            RelayError::Construction(_)
            | RelayError::Transport(_)
            | RelayError::Classification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Construction(_) => "construction",
            RelayError::Transport(_) => "transport",
            RelayError::Classification(_) => "classification",
            RelayError::InboundBody(_) => "inbound_body",
        }
    }

    /// Build a transport error from a client error, keeping its whole source chain.
    pub fn transport(err: &(dyn std::error::Error + 'static)) -> Self {
        RelayError::Transport(error_chain(err))
    }
}

/// Errors raised by a [`ResponseSink`](crate::relay::sink::ResponseSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The client connection is gone.
    #[error("client connection closed")]
    Closed,

    /// A response head was committed twice.
    #[error("response head already committed")]
    AlreadyCommitted,
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // reqwest repeats the inner message in some Display impls
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
