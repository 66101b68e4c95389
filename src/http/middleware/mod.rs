//! Middleware applied uniformly to every inbound request.

pub mod cors;

pub use cors::{cors_middleware, CorsPolicy};
