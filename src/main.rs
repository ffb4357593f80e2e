//! socket-proxy
//!
//! Forwards plain HTTP and WebSocket traffic to a single backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     SOCKET PROXY                      │
//!                     │                                                       │
//!   Client Request    │  ┌──────────┐    ┌────────────┐   plain   ┌─────────┐ │
//!   ──────────────────┼─▶│ listener │───▶│ dispatcher │──────────▶│ pass-   │─┼──▶ Backend
//!                     │  │ TCP/TLS  │    │ + blacklist│           │ through │ │    (http/https)
//!                     │  └──────────┘    └─────┬──────┘           └─────────┘ │
//!                     │                        │ Upgrade: websocket           │
//!                     │                        ▼                              │
//!                     │  ┌──────────┐    ┌────────────┐    ┌───────────────┐  │
//!   ◀═════════════════┼══│  relay   │◀══▶│  origin    │◀───│ dial backend  │◀═┼══▶ Backend
//!   WebSocket frames  │  │ +keepalive│   │  check     │    │ (ws/wss, TLS) │  │    (ws/wss)
//!                     │  └──────────┘    └────────────┘    └───────────────┘  │
//!                     │                                                       │
//!                     │   config · logging/metrics · shutdown · session count │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::net::TcpListener;

use socket_proxy::config::validation::validate_config;
use socket_proxy::config::{load_config, ConfigError, ProxyConfig};
use socket_proxy::net::tls::load_tls_config;
use socket_proxy::observability::{logging, metrics};
use socket_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "socket-proxy")]
#[command(about = "Reverse proxy for plain HTTP and WebSocket traffic to a single backend", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`
    #[arg(long)]
    bind: Option<String>,

    /// Backend endpoint URL, overrides `backend.endpoint`
    #[arg(long)]
    endpoint: Option<String>,

    /// Trusted client origin for upgrades, overrides `websocket.trusted_origin`
    #[arg(long)]
    origin: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(endpoint) = self.endpoint {
            config.backend.endpoint = endpoint;
        }
        if let Some(origin) = self.origin {
            config.websocket.trusted_origin = origin;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => load_config(&path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_tracing(&config.observability.log_level);

    // Several rustls providers can end up in the build; pin one for the listener.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    tracing::info!("socket-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoint = %config.backend.endpoint,
        trusted_origin = %config.websocket.trusted_origin,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signal_task = shutdown.trigger_on_signal();

    let listener_tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;
    let tracker = server.tracker();

    match listener_tls {
        Some(tls) => {
            let rustls_config = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server
                .run_tls(bind_address.parse()?, rustls_config, shutdown.subscribe())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server.run(listener, shutdown.subscribe()).await?;
        }
    }

    signal_task.abort();

    let remaining = tracker.active_count();
    if remaining > 0 {
        tracing::info!(sessions = remaining, "Dropping open WebSocket sessions");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
