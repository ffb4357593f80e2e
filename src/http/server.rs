//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Build shared state from the validated config
//! - Create the Axum router with a catch-all handler
//! - Wire up middleware (request ID, tracing)
//! - Dispatch each request to the passthrough or the WebSocket pipeline
//! - Serve over plain TCP or TLS with graceful shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::headers::{is_websocket_upgrade, HeaderPolicy, HeaderPolicyError};
use crate::http::passthrough::Passthrough;
use crate::net::tls::{self, TlsError};
use crate::net::{backend_client, SessionTracker};
use crate::observability::metrics;
use crate::routing::{Endpoint, EndpointError};
use crate::websocket::{BackendConnector, RelaySettings, WebSocketProxy};

/// How long in-flight requests get to finish once shutdown starts on the TLS listener.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure building the server from its config.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Headers(#[from] HeaderPolicyError),
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<HeaderPolicy>,
    pub passthrough: Passthrough,
    pub websocket: Arc<WebSocketProxy>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    tracker: SessionTracker,
    endpoint: Endpoint,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let endpoint = Endpoint::parse(&config.backend.endpoint)?;
        let tls = tls::client_config(config.backend.ca_path.as_deref().map(Path::new))?;
        let policy = Arc::new(HeaderPolicy::from_config(&config.headers)?);

        let connect_timeout = Duration::from_secs(config.backend.connect_timeout_secs);
        let client = backend_client(tls, connect_timeout, Duration::from_secs(config.backend.keepalive_secs));

        let passthrough = Passthrough::new(endpoint.clone(), client.clone());
        let connector = BackendConnector::new(client, connect_timeout);
        let settings = RelaySettings {
            ping_interval: Duration::from_secs(config.websocket.ping_interval_secs),
            write_timeout: Duration::from_secs(config.websocket.write_timeout_secs),
        };
        let tracker = SessionTracker::new();

        let websocket = Arc::new(WebSocketProxy::new(
            endpoint.clone(),
            Arc::clone(&policy),
            connector,
            config.websocket.trusted_origin.clone(),
            settings,
            tracker.clone(),
        ));

        let state = AppState {
            policy,
            passthrough,
            websocket,
        };

        Ok(Self {
            router: Self::build_router(state),
            tracker,
            endpoint,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id());

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware)
    }

    /// Live WebSocket sessions, for shutdown reporting.
    pub fn tracker(&self) -> SessionTracker {
        self.tracker.clone()
    }

    /// Run the server on a plain TCP listener until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoint = %self.endpoint.url(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server behind TLS until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        config: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            endpoint = %self.endpoint.url(),
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            signal.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, config)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Catch-all handler.
/// Strips blacklisted headers, then routes upgrades to the WebSocket pipeline and
/// everything else to the passthrough.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let (mut parts, body) = request.into_parts();

    state.policy.strip_blacklisted(&mut parts.headers);

    if is_websocket_upgrade(&parts.headers) {
        tracing::debug!(peer = %peer, path = %parts.uri.path(), "WebSocket upgrade request");
        let response = state.websocket.handle(parts).await;
        metrics::record_request(method.as_str(), response.status().as_u16(), "websocket", start_time);
        return response;
    }

    let response = match state.passthrough.forward(Request::from_parts(parts, body), peer).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "Upstream error");
            (e.status_code(), "Upstream request failed").into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), "http", start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_endpoint() {
        let mut config = ProxyConfig::default();
        config.backend.endpoint = "ftp://files.internal".to_string();
        assert!(matches!(HttpServer::new(config), Err(ServerError::Endpoint(_))));
    }

    #[test]
    fn rejects_bad_blacklist_entry() {
        let mut config = ProxyConfig::default();
        config.headers.blacklist = vec!["not a header".to_string()];
        assert!(matches!(HttpServer::new(config), Err(ServerError::Headers(_))));
    }

    #[tokio::test]
    async fn builds_from_defaults() {
        let server = HttpServer::new(ProxyConfig::default()).unwrap();
        assert_eq!(server.tracker().active_count(), 0);
    }
}
