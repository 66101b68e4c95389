//! Transparent HTTP relay for chat-completion style APIs.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::{Dispatcher, RelayError, RelayMode};
