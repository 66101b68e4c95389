//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/cors.rs (preflight short-circuit, CORS headers)
//!     → request.rs (request ID, normalize into InboundRequest)
//!     → [relay dispatcher on its own task]
//!     → response.rs (streamed head + frames, or complete result, or error)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RelayRequestId, X_REQUEST_ID};
pub use response::{channel_sink, ChannelSink};
pub use server::{AppState, HttpServer, ServerError};
