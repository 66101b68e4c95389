//! llm-relay
//!
//! A transparent HTTP relay in front of a chat-completions style upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ http (CORS, request id) ─▶ relay dispatcher │
//!                           │                                  │           │
//!                           │                    classify: buffered /      │
//!                           │                    streaming / passthrough   │
//!                           │                                  ▼           │
//!     Client Response       │                              forwarder ──────┼──▶ Upstream
//!     ◀─────────────────────┼── response (complete or streamed) ◀──────────┼───
//!                           └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use llm_relay::config::{resolve_config, ConfigOverrides};
use llm_relay::lifecycle::signals::spawn_signal_handler;
use llm_relay::observability::{logging, metrics};
use llm_relay::{HttpServer, RelayMode, Shutdown};

#[derive(Parser)]
#[command(name = "llm-relay")]
#[command(about = "Transparent relay for chat-completion APIs", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// json or passthrough
    #[arg(long, env = "RELAY_MODE")]
    mode: Option<RelayMode>,

    /// Fixed upstream endpoint for the JSON relay
    #[arg(long, env = "RELAY_ENDPOINT")]
    endpoint: Option<String>,

    /// Upstream host for the passthrough relay
    #[arg(long, env = "RELAY_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "RELAY_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        bind_address: cli.bind,
        mode: cli.mode,
        endpoint: cli.endpoint,
        base_url: cli.base_url,
        log_level: cli.log_level,
    };
    let config = resolve_config(cli.config.as_deref(), overrides)?;

    logging::init_logging(&config.observability)?;

    tracing::info!("llm-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = config.upstream.mode.as_str(),
        endpoint = %config.upstream.endpoint,
        base_url = %config.upstream.base_url,
        request_timeout_secs = ?config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // validated at load time
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
