//! Live output channel to the original caller.

use async_trait::async_trait;
use axum::body::Bytes;

use crate::relay::error::{RelayError, SinkError};
use crate::relay::types::ResponseHead;

/// Where a streamed response goes.
///
/// `commit` must be called exactly once and before any `write`. After a failed
/// `write` or `flush` the client is considered gone and nothing more is sent.
#[async_trait]
pub trait ResponseSink: Send {
    /// Send status line and headers.
    async fn commit(&mut self, head: ResponseHead) -> Result<(), SinkError>;

    /// Send one body chunk.
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Push buffered bytes to the client.
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Terminate a committed response abnormally.
    async fn fail(&mut self, error: &RelayError);
}

#[async_trait]
impl<'a, S> ResponseSink for &'a mut S
where
    S: ResponseSink + ?Sized,
{
    async fn commit(&mut self, head: ResponseHead) -> Result<(), SinkError> {
        (**self).commit(head).await
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        (**self).write(chunk).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush().await
    }

    async fn fail(&mut self, error: &RelayError) {
        (**self).fail(error).await
    }
}
