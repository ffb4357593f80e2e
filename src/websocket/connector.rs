//! Backend WebSocket dialing.
//!
//! # Responsibilities
//! - Build the HTTP/1.1 upgrade request from the target URL and the transformed headers
//! - Send it through the shared backend client, bounded by a timeout
//! - Check the 101 answer and hand the upgraded connection to tungstenite
//! - Classify failures into the status code the client should see
//!
//! # Design Decisions
//! - A backend answering with a non-101 status has that status forwarded as-is
//! - Every other failure is a 502: the client only needs to know the backend is unusable
//! - The backend may accept without choosing a subprotocol; the session still relays

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{
    CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use crate::net::BackendClient;

/// Default dial and TLS handshake timeout.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// An established backend connection.
pub type BackendStream = WebSocketStream<TokioIo<Upgraded>>;

/// Why a backend dial failed.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("backend answered the upgrade with {status}")]
    Rejected { status: StatusCode },
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Unreachable(hyper_util::client::legacy::Error),
    #[error("backend handshake failed: {0}")]
    Handshake(String),
    #[error("invalid dial request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
}

impl DialError {
    /// Status code reported to the client for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DialError::Rejected { status } => *status,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Backend status, if the backend answered at all.
    pub fn backend_status(&self) -> Option<StatusCode> {
        match self {
            DialError::Rejected { status } => Some(*status),
            _ => None,
        }
    }
}

/// Dials WebSocket connections to the configured backend.
#[derive(Clone)]
pub struct BackendConnector {
    client: BackendClient,
    timeout: Duration,
}

impl BackendConnector {
    pub fn new(client: BackendClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build the upgrade request: every header in `headers` plus a fresh handshake.
    /// `ws`/`wss` targets are sent as `http`/`https`.
    pub fn request(&self, target: &Url, headers: &HeaderMap) -> Result<Request<Body>, DialError> {
        let mut url = target.clone();
        let scheme = if url.scheme() == "wss" { "https" } else { "http" };
        // ws, wss, http and https are all special schemes, so this cannot fail.
        let _ = url.set_scheme(scheme);
        let uri: Uri = url.as_str().parse().map_err(axum::http::Error::from)?;

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())?;

        let outbound = request.headers_mut();
        *outbound = headers.clone();
        outbound.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        outbound.insert(UPGRADE, HeaderValue::from_static("websocket"));
        outbound.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        outbound.insert(
            SEC_WEBSOCKET_KEY,
            HeaderValue::from_str(&generate_key()).map_err(axum::http::Error::from)?,
        );

        Ok(request)
    }

    /// Open a WebSocket connection to `target`.
    pub async fn dial(&self, target: &Url, headers: &HeaderMap) -> Result<BackendStream, DialError> {
        let request = self.request(target, headers)?;
        let expected_accept = request
            .headers()
            .get(SEC_WEBSOCKET_KEY)
            .map(|key| derive_accept_key(key.as_bytes()));

        let handshake = async {
            let response = self.client.request(request).await.map_err(DialError::Unreachable)?;

            let status = response.status();
            if status != StatusCode::SWITCHING_PROTOCOLS {
                return Err(DialError::Rejected { status });
            }

            let accept = response.headers().get(SEC_WEBSOCKET_ACCEPT).and_then(|v| v.to_str().ok());
            if accept != expected_accept.as_deref() {
                return Err(DialError::Handshake("Sec-WebSocket-Accept does not match the key".into()));
            }

            let subprotocol = response
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            let upgraded = hyper::upgrade::on(response)
                .await
                .map_err(|e| DialError::Handshake(e.to_string()))?;

            tracing::debug!(url = %target, subprotocol = %subprotocol, "Backend WebSocket connected");
            let stream = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Client, None).await;
            Ok::<BackendStream, DialError>(stream)
        };

        match tokio::time::timeout(self.timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(DialError::Timeout(self.timeout)),
        }
    }
}

impl std::fmt::Debug for BackendConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnector")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
