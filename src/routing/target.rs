//! Backend endpoint and request target rewriting.

use std::str::FromStr;

use axum::http::uri::{Authority, InvalidUri, Scheme};
use axum::http::Uri;
use url::Url;

/// Error raised when the configured endpoint cannot be used as a proxy target.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid endpoint URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("endpoint scheme must be http or https, got '{0}'")]
    Scheme(String),
    #[error("endpoint has no host")]
    MissingHost,
    #[error("endpoint authority is not a valid URI authority: {0}")]
    Authority(#[from] InvalidUri),
}

/// The single backend every request is forwarded to.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    scheme: Scheme,
    authority: Authority,
}

impl Endpoint {
    /// Parse and check an endpoint URL.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(raw)?;
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(EndpointError::Scheme(other.to_string())),
        };
        let host = url.host_str().ok_or(EndpointError::MissingHost)?;
        let authority = match url.port() {
            Some(port) => Authority::from_str(&format!("{}:{}", host, port))?,
            None => Authority::from_str(host)?,
        };

        Ok(Self {
            url,
            scheme,
            authority,
        })
    }

    /// The endpoint as configured.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the backend is reached over TLS.
    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::HTTPS
    }

    /// Rewrite an inbound request URI to point at the backend.
    ///
    /// The backend's base path is joined with the request path; the query is kept.
    pub fn http_uri(&self, inbound: &Uri) -> Result<Uri, axum::http::Error> {
        let path = single_joining_slash(self.url.path(), inbound.path());
        let path_and_query = match inbound.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }

    /// WebSocket URL for an inbound upgrade request (`http→ws`, `https→wss`).
    pub fn websocket_url(&self, inbound: &Uri) -> Url {
        let mut url = self.url.clone();
        let scheme = if self.is_tls() { "wss" } else { "ws" };
        // http and https are both special schemes, so switching to ws/wss cannot fail.
        let _ = url.set_scheme(scheme);
        url.set_path(&single_joining_slash(self.url.path(), inbound.path()));
        url.set_query(inbound.query());
        url.set_fragment(None);
        url
    }
}

/// Join two path segments with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    let a_slash = a.ends_with('/');
    let b_slash = b.starts_with('/');
    match (a_slash, b_slash) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}
