//! Relay core.
//!
//! # Data Flow
//! ```text
//! InboundRequest (from the execution boundary)
//!     → dispatcher.rs (read body, classify: buffered / streaming / passthrough)
//!     → forwarder.rs (build OutboundRequest, issue it once)
//!     → transport.rs (UpstreamTransport: reqwest in production)
//!     → forwarder.rs
//!         buffered:    read upstream body → RelayResult::Complete
//!         streaming:   commit head → copy chunks into sink.rs → RelayResult::Streamed
//! ```
//!
//! # Design Decisions
//! - Exactly one outbound request per inbound request; no retries
//! - Errors before the head is committed become a terminal 500 response;
//!   errors after it only end the stream
//! - The upstream body is dropped (connection released) on every exit path
//! - No timeouts here; the boundary may impose a wall-clock limit

pub mod dispatcher;
pub mod error;
pub mod forwarder;
pub mod sink;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{classify, Dispatcher};
pub use error::{RelayError, SinkError};
pub use forwarder::Forwarder;
pub use sink::ResponseSink;
pub use transport::{ReqwestTransport, UpstreamBody, UpstreamTransport};
pub use types::{
    ForwardMode, InboundBody, InboundRequest, OutboundBody, OutboundRequest, RelayBody,
    RelayMode, RelayResult, ResponseHead, StreamOutcome, StreamSummary, UpstreamResponse,
};
