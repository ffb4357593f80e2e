//! Outbound HTTP client shared by the passthrough and the WebSocket dialer.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// HTTP/1.1 client speaking plain HTTP or HTTPS to the backend.
pub type BackendClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the backend client over the given TLS config.
pub fn backend_client(
    tls: Arc<rustls::ClientConfig>,
    connect_timeout: Duration,
    keepalive: Duration,
) -> BackendClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(connect_timeout));
    http.set_keepalive(Some(keepalive));

    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls.as_ref().clone())
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new()).build(https)
}
