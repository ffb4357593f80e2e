//! Per-request WebSocket proxy pipeline.
//!
//! # Data Flow
//! ```text
//! upgrade request (blacklist already stripped)
//!     → validate the client handshake (axum extractor)
//!     → build dial headers, pick subprotocol        [Dialing]
//!     → dial backend (502 / backend status on failure)
//!     → origin check (403 on failure)               [Upgrading]
//!     → 101 to the client with the chosen subprotocol
//!     → relay until the first terminal event        [Relaying → Closed]
//! ```
//!
//! The client handshake is validated before dialing so malformed requests never open a
//! backend connection. The 101 is only sent once the backend connection is up.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::FromRequestParts;
use axum::http::header::ORIGIN;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use std::sync::Arc;

use crate::http::headers::{HeaderPolicy, UpgradeHeaders};
use crate::net::{SessionId, SessionState, SessionTracker};
use crate::observability::metrics;
use crate::routing::Endpoint;
use crate::websocket::connector::BackendConnector;
use crate::websocket::origin;
use crate::websocket::relay::{self, RelaySettings};

/// Everything an upgrade request needs, shared by all sessions.
pub struct WebSocketProxy {
    endpoint: Endpoint,
    policy: Arc<HeaderPolicy>,
    connector: BackendConnector,
    trusted_origin: String,
    settings: RelaySettings,
    tracker: SessionTracker,
}

impl WebSocketProxy {
    pub fn new(
        endpoint: Endpoint,
        policy: Arc<HeaderPolicy>,
        connector: BackendConnector,
        trusted_origin: String,
        settings: RelaySettings,
        tracker: SessionTracker,
    ) -> Self {
        if trusted_origin.is_empty() {
            tracing::warn!(
                "No trusted origin configured: accepting WebSocket upgrades from any origin. \
                 This is insecure and should only be used behind another origin check"
            );
        }

        Self {
            endpoint,
            policy,
            connector,
            trusted_origin,
            settings,
            tracker,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Run the upgrade pipeline for one request and produce the client response.
    pub async fn handle(&self, mut parts: Parts) -> Response {
        let id = SessionId::new();

        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => upgrade,
            Err(rejection) => {
                tracing::warn!(session = %id, error = %rejection, "Rejected malformed upgrade request");
                return rejection.into_response();
            }
        };

        let UpgradeHeaders {
            headers,
            subprotocol,
        } = self.policy.upgrade_headers(&parts.headers, parts.uri.query());
        let target = self.endpoint.websocket_url(&parts.uri);

        tracing::debug!(
            session = %id,
            state = %SessionState::Dialing,
            url = %target,
            subprotocol = subprotocol.as_deref().unwrap_or(""),
            "Dialing backend"
        );

        let backend = match self.connector.dial(&target, &headers).await {
            Ok(backend) => backend,
            Err(err) => {
                let status = err.status_code();
                tracing::error!(
                    session = %id,
                    url = %target,
                    status = %status,
                    backend_status = ?err.backend_status().map(|s| s.as_u16()),
                    error = %err,
                    "Failed to dial backend"
                );
                metrics::record_dial_failure(status.as_u16());
                return (status, format!("Failed to dial backend: {}", err)).into_response();
            }
        };

        let offered = parts.headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        if let Err(rejection) = origin::check(offered, &self.trusted_origin) {
            tracing::warn!(
                session = %id,
                configured = %self.trusted_origin,
                offered = offered.unwrap_or("<none>"),
                reason = %rejection,
                "Rejected WebSocket origin"
            );
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }

        tracing::debug!(session = %id, state = %SessionState::Upgrading, "Upgrading client connection");

        let upgrade = match subprotocol {
            Some(protocol) => upgrade.protocols([protocol]),
            None => upgrade,
        };

        let tracker = self.tracker.clone();
        let settings = self.settings;

        upgrade
            .on_failed_upgrade(move |e| {
                tracing::warn!(session = %id, error = %e, "Client upgrade failed");
            })
            .on_upgrade(move |socket| async move {
                let session = tracker.track(id);
                tracing::debug!(session = %session.id(), state = %SessionState::Relaying, "Relaying frames");

                let (client_tx, client_rx) = socket.split();
                let (backend_tx, backend_rx) = backend.split();
                let cause = relay::run(client_rx, client_tx, backend_rx, backend_tx, settings).await;

                tracing::debug!(
                    session = %session.id(),
                    state = %SessionState::Closed,
                    clean = cause.is_clean_close(),
                    reason = %cause,
                    "WebSocket session ended"
                );
            })
    }
}
