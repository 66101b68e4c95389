//! Scripted transport and recording sink for relay unit tests.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::relay::error::{RelayError, SinkError};
use crate::relay::sink::ResponseSink;
use crate::relay::transport::{UpstreamBody, UpstreamTransport};
use crate::relay::types::{OutboundBody, OutboundRequest, ResponseHead, UpstreamResponse};

/// One scripted upstream behaviour.
pub enum Script {
    /// Fail before any response, like a refused connection.
    Refuse(&'static str),
    /// Answer with status, headers and a sequence of body reads.
    Respond {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        chunks: Vec<Result<&'static [u8], &'static str>>,
    },
}

impl Script {
    pub fn ok(status: u16, body: &'static [u8]) -> Self {
        Script::Respond {
            status,
            headers: vec![("content-type", "application/json")],
            chunks: vec![Ok(body)],
        }
    }
}

/// A successful body read, for use in [`Script::Respond`].
pub fn chunk(bytes: &'static [u8]) -> Result<&'static [u8], &'static str> {
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<RecordedRequest>>,
    pub released: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamTransport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, RelayError> {
        let body = match request.body {
            OutboundBody::Full(bytes) => bytes,
            OutboundBody::Stream(body) => axum::body::to_bytes(body, usize::MAX).await.unwrap(),
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.to_string(),
            headers: request.headers,
            body,
        });

        let script = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted upstream response left");
        match script {
            Script::Refuse(msg) => Err(RelayError::Transport(msg.to_string())),
            Script::Respond { status, headers, chunks } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(HeaderName::from_static(name), HeaderValue::from_static(value));
                }
                Ok(UpstreamResponse {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers: map,
                    body: Box::new(MockBody {
                        chunks: chunks.into(),
                        released: self.released.clone(),
                        reads: self.reads.clone(),
                    }),
                })
            }
        }
    }
}

struct MockBody {
    chunks: VecDeque<Result<&'static [u8], &'static str>>,
    released: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamBody for MockBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, RelayError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.chunks.pop_front() {
            Some(Ok(chunk)) => Ok(Some(Bytes::from_static(chunk))),
            Some(Err(msg)) => Err(RelayError::Transport(msg.to_string())),
            None => Ok(None),
        }
    }
}

impl Drop for MockBody {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Commit(ResponseHead),
    Write(Bytes),
    Flush,
    Fail(String),
}

/// Sink that records every call. `accept_writes` simulates a client that
/// disconnects after that many writes.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
    pub accept_writes: Option<usize>,
    committed: bool,
    writes: usize,
}

impl RecordingSink {
    pub fn disconnecting_after(writes: usize) -> Self {
        Self {
            accept_writes: Some(writes),
            ..Default::default()
        }
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Write(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn head(&self) -> Option<&ResponseHead> {
        self.events.iter().find_map(|e| match e {
            SinkEvent::Commit(head) => Some(head),
            _ => None,
        })
    }
}

#[async_trait]
impl ResponseSink for RecordingSink {
    async fn commit(&mut self, head: ResponseHead) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        self.committed = true;
        self.events.push(SinkEvent::Commit(head));
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        assert!(self.committed, "body written before head was committed");
        if self.accept_writes.is_some_and(|n| self.writes >= n) {
            return Err(SinkError::Closed);
        }
        self.writes += 1;
        self.events.push(SinkEvent::Write(chunk));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.events.push(SinkEvent::Flush);
        Ok(())
    }

    async fn fail(&mut self, error: &RelayError) {
        self.events.push(SinkEvent::Fail(error.to_string()));
    }
}
