//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all relay handler
//! - Wire up middleware (CORS, request ID, tracing, optional timeout)
//! - Bind server to listener
//! - Run each relay on its own task and answer as soon as a head is available
//! - Observability (metrics, correlation IDs)

use axum::{
    body::Body,
    extract::State,
    http::{header::InvalidHeaderValue, Request, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::RelayConfig;
use crate::http::middleware::{cors_middleware, CorsPolicy};
use crate::http::request::{inbound_from_request, request_id, RelayRequestId};
use crate::http::response::{channel_sink, complete_response, streaming_response};
use crate::observability::metrics;
use crate::relay::{
    Dispatcher, RelayBody, RelayError, RelayResult, ReqwestTransport, StreamOutcome,
    UpstreamTransport,
};

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("invalid CORS header value: {0}")]
    Cors(#[from] InvalidHeaderValue),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub channel_capacity: usize,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Create a new HTTP server relaying through a reqwest client.
    pub fn new(config: RelayConfig) -> Result<Self, ServerError> {
        let transport = Arc::new(ReqwestTransport::new(&config.upstream)?);
        Self::with_transport(config, transport)
    }

    /// Create a server on top of an explicit upstream transport.
    pub fn with_transport(
        config: RelayConfig,
        transport: Arc<dyn UpstreamTransport>,
    ) -> Result<Self, ServerError> {
        let dispatcher = Arc::new(Dispatcher::from_config(&config, transport)?);
        let cors = Arc::new(CorsPolicy::try_from(&config.cors)?);

        let state = AppState {
            dispatcher,
            channel_capacity: config.streaming.channel_capacity,
        };

        let router = Self::build_router(&config, state, cors);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState, cors: Arc<CorsPolicy>) -> Router {
        let router = Router::new()
            .route("/{*path}", any(relay_handler))
            .route("/", any(relay_handler))
            .with_state(state);

        // bounds the time to a response head; a committed stream is not cut
        let router = match config.timeouts.request_secs {
            Some(secs) => router.layer(TimeoutLayer::new(Duration::from_secs(secs))),
            None => router,
        };

        router
            .layer(from_fn_with_state(cors, cors_middleware))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(RelayRequestId))
    }

    /// The fully layered router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = self.config.upstream.mode.as_str(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Handle to a spawned relay that aborts it when dropped, unless detached.
///
/// Dropping the handler (client gone, boundary timeout) before a head is
/// committed therefore drops the upstream response and releases its connection.
struct RelayTask<T> {
    handle: JoinHandle<T>,
    detached: bool,
}

impl<T> RelayTask<T> {
    fn new(handle: JoinHandle<T>) -> Self {
        Self {
            handle,
            detached: false,
        }
    }

    /// Let the task run to completion on its own; used once a stream is committed.
    fn detach(mut self) {
        self.detached = true;
    }

    async fn join(&mut self) -> Result<T, JoinError> {
        (&mut self.handle).await
    }
}

impl<T> Drop for RelayTask<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.handle.abort();
        }
    }
}

/// Catch-all relay handler.
/// Runs the dispatcher on its own task and answers with whichever comes first:
/// a committed streaming head, or the finished relay result.
async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Relaying request"
    );

    let dispatcher = state.dispatcher.clone();
    let mode = dispatcher.mode().as_str();
    let inbound = inbound_from_request(request);
    let (sink, head_rx, frames) = channel_sink(state.channel_capacity);

    let span = tracing::info_span!("relay", request_id = %request_id);
    let mut task = RelayTask::new(tokio::spawn(
        async move {
            let result = dispatcher.dispatch(inbound, sink).await;
            if let Ok(RelayResult {
                body: RelayBody::Streamed(summary),
                ..
            }) = &result
            {
                match &summary.outcome {
                    StreamOutcome::Completed => {
                        tracing::debug!(bytes = summary.bytes, chunks = summary.chunks, "Stream completed")
                    }
                    StreamOutcome::UpstreamFailed(error) => {
                        tracing::warn!(bytes = summary.bytes, error = %error, "Upstream failed mid-stream")
                    }
                    StreamOutcome::ClientGone => {
                        tracing::info!(bytes = summary.bytes, "Client disconnected mid-stream")
                    }
                }
                metrics::record_stream(mode, summary);
            }
            result
        }
        .instrument(span),
    ));

    if let Ok(head) = head_rx.await {
        task.detach();
        metrics::record_request(mode, head.status.as_u16(), start_time);
        return streaming_response(head, frames);
    }

    match task.join().await {
        Ok(Ok(result)) => {
            metrics::record_request(mode, result.status.as_u16(), start_time);
            complete_response(result)
        }
        Ok(Err(e)) => {
            tracing::warn!(request_id = %request_id, kind = e.kind(), error = %e, "Relay failed");
            metrics::record_error(&e);
            metrics::record_request(mode, e.status_code().as_u16(), start_time);
            e.into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Relay task aborted");
            metrics::record_request(mode, 500, start_time);
            (StatusCode::INTERNAL_SERVER_ERROR, "relay task failed").into_response()
        }
    }
}
