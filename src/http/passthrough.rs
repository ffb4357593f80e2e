//! Plain HTTP forwarding to the backend.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the backend endpoint
//! - Strip hop-by-hop headers both ways and append `X-Forwarded-For`
//! - Stream request and response bodies without buffering

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Version};
use axum::response::Response;

use crate::http::headers::{filter_response_headers, strip_hop_by_hop};
use crate::net::BackendClient;
use crate::routing::Endpoint;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[derive(Debug, thiserror::Error)]
pub enum PassthroughError {
    #[error("cannot build backend URI: {0}")]
    Uri(#[from] axum::http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

impl PassthroughError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PassthroughError::Uri(_) => StatusCode::BAD_REQUEST,
            PassthroughError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Forwards non-upgrade requests to the backend endpoint.
#[derive(Clone)]
pub struct Passthrough {
    client: BackendClient,
    endpoint: Endpoint,
}

impl Passthrough {
    pub fn new(endpoint: Endpoint, client: BackendClient) -> Self {
        Self { client, endpoint }
    }

    /// Send `request` to the backend and return its response with hop-by-hop
    /// headers removed. Bodies stream through frame by frame.
    pub async fn forward(&self, request: Request<Body>, peer: SocketAddr) -> Result<Response, PassthroughError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.endpoint.http_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(HOST);
        append_forwarded_for(&mut parts.headers, peer.ip());

        tracing::debug!(method = %parts.method, uri = %parts.uri, "Forwarding request");

        let response = self.client.request(Request::from_parts(parts, body)).await?;
        let (mut parts, body) = response.into_parts();
        filter_response_headers(&mut parts.headers);

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Append the client address to `X-Forwarded-For`, folding any prior values into one.
fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_starts_chain() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.7".parse().unwrap());
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.7");
    }

    #[test]
    fn forwarded_for_extends_chain() {
        let mut headers = HeaderMap::new();
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.1"));
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("198.51.100.2"));

        append_forwarded_for(&mut headers, "::1".parse().unwrap());

        assert_eq!(headers.get_all(X_FORWARDED_FOR).iter().count(), 1);
        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.1, 198.51.100.2, ::1");
    }

    #[test]
    fn unbuildable_target_is_bad_request() {
        let err = PassthroughError::Uri(Request::builder().uri("\u{0}").body(()).unwrap_err());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
