//! Response construction for the listening-socket boundary.
//!
//! # Responsibilities
//! - Provide the channel-backed [`ResponseSink`] a relay task streams into
//! - Turn a committed head plus the frame channel into an axum streaming response
//! - Render complete results and relay errors
//!
//! # Design Decisions
//! - The head travels over a oneshot so the handler can answer as soon as it is committed
//! - Body frames travel over a bounded mpsc channel; a full channel applies back-pressure
//!   to the upstream read loop
//! - A dropped client drops the receiver, so the next `write` fails with `SinkError::Closed`

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use std::io;
use tokio::sync::{mpsc, oneshot};

use crate::relay::{RelayBody, RelayError, RelayResult, ResponseHead, ResponseSink, SinkError};

/// One body frame; an `Err` aborts the response body.
pub type Frame = Result<Bytes, io::Error>;

/// Sink whose output ends up in an axum response body.
#[derive(Debug)]
pub struct ChannelSink {
    head: Option<oneshot::Sender<ResponseHead>>,
    frames: mpsc::Sender<Frame>,
}

/// Create a sink plus the receiving halves the handler turns into a response.
pub fn channel_sink(
    capacity: usize,
) -> (ChannelSink, oneshot::Receiver<ResponseHead>, mpsc::Receiver<Frame>) {
    let (head_tx, head_rx) = oneshot::channel();
    let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));
    let sink = ChannelSink {
        head: Some(head_tx),
        frames: frames_tx,
    };
    (sink, head_rx, frames_rx)
}

#[async_trait]
impl ResponseSink for ChannelSink {
    async fn commit(&mut self, head: ResponseHead) -> Result<(), SinkError> {
        let tx = self.head.take().ok_or(SinkError::AlreadyCommitted)?;
        tx.send(head).map_err(|_| SinkError::Closed)
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.frames.send(Ok(chunk)).await.map_err(|_| SinkError::Closed)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        // frames are handed to hyper as soon as they are received
        if self.frames.is_closed() {
            Err(SinkError::Closed)
        } else {
            Ok(())
        }
    }

    async fn fail(&mut self, error: &RelayError) {
        let _ = self.frames.send(Err(io::Error::other(error.to_string()))).await;
    }
}

/// Response whose body is fed by a relay task through `frames`.
pub fn streaming_response(head: ResponseHead, frames: mpsc::Receiver<Frame>) -> Response {
    let stream = futures_util::stream::unfold(frames, |mut frames| async move {
        frames.recv().await.map(|frame| (frame, frames))
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}

/// Response for a relay that finished before anything was committed.
pub fn complete_response(result: RelayResult) -> Response {
    let body = match result.body {
        RelayBody::Complete(bytes) => Body::from(bytes),
        RelayBody::Streamed(_) => Body::empty(),
    };

    let mut response = Response::new(body);
    *response.status_mut() = result.status;
    *response.headers_mut() = result.headers;
    response
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.to_string(),
        )
            .into_response()
    }
}
