//! Header manipulation for both proxy paths.
//!
//! # Responsibilities
//! - Strip blacklisted request headers before anything else sees them
//! - Build the header set sent with a backend WebSocket dial
//! - Translate a `token` query parameter into a bearer `Authorization` header
//! - Strip hop-by-hop headers on the plain HTTP path
//!
//! # Design Decisions
//! - Pure functions over `HeaderMap`; nothing here touches the network
//! - The dial header set is built fresh per request and never shared
//! - Only one subprotocol is forwarded: the last one offered

use axum::http::header::{
    AUTHORIZATION, CONNECTION, HOST, ORIGIN, PROXY_AUTHORIZATION, SEC_WEBSOCKET_EXTENSIONS,
    SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, TE, TRAILER,
    TRANSFER_ENCODING, UPGRADE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::HeaderConfig;

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// Query parameter carrying a bearer token for WebSocket upgrades.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Handshake headers that must not be replayed on a fresh backend dial.
const WEBSOCKET_DIAL_HEADERS: [HeaderName; 5] = [
    CONNECTION,
    SEC_WEBSOCKET_EXTENSIONS,
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION,
    UPGRADE,
];

/// Headers removed from backend responses on the plain HTTP path.
const RESPONSE_HOP_HEADERS: [HeaderName; 5] = [
    CONNECTION,
    KEEP_ALIVE,
    PROXY_CONNECTION,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Hop-by-hop headers removed from requests on the plain HTTP path.
const REQUEST_HOP_HEADERS: [HeaderName; 8] = [
    CONNECTION,
    KEEP_ALIVE,
    PROXY_CONNECTION,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// A configured header value could not be used.
#[derive(Debug, thiserror::Error)]
pub enum HeaderPolicyError {
    #[error("invalid blacklisted header name '{0}'")]
    Name(String),
    #[error("invalid backend origin '{0}'")]
    Origin(String),
}

/// Header rewriting rules, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    blacklist: Vec<HeaderName>,
    backend_origin: Option<HeaderValue>,
}

impl HeaderPolicy {
    pub fn new(blacklist: Vec<HeaderName>, backend_origin: Option<HeaderValue>) -> Self {
        Self {
            blacklist,
            backend_origin,
        }
    }

    pub fn from_config(config: &HeaderConfig) -> Result<Self, HeaderPolicyError> {
        let blacklist = config
            .blacklist
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| HeaderPolicyError::Name(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let backend_origin = config
            .backend_origin
            .as_deref()
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| HeaderPolicyError::Origin(origin.to_string()))
            })
            .transpose()?;

        Ok(Self::new(blacklist, backend_origin))
    }

    /// Remove every blacklisted header from an inbound request.
    pub fn strip_blacklisted(&self, headers: &mut HeaderMap) {
        for name in &self.blacklist {
            headers.remove(name);
        }
    }

    /// Build the header set for a backend WebSocket dial.
    ///
    /// `inbound` is expected to have been through [`strip_blacklisted`](Self::strip_blacklisted)
    /// already; `query` is the raw query string of the inbound URI.
    pub fn upgrade_headers(&self, inbound: &HeaderMap, query: Option<&str>) -> UpgradeHeaders {
        let mut headers = HeaderMap::with_capacity(inbound.len());
        let mut subprotocol = None;

        for (name, value) in inbound {
            if name == SEC_WEBSOCKET_PROTOCOL || name == HOST {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        for value in inbound.get_all(SEC_WEBSOCKET_PROTOCOL) {
            let Ok(offered) = value.to_str() else {
                continue;
            };
            for protocol in offered.split(',').map(str::trim) {
                if protocol.is_empty() {
                    continue;
                }
                if let Ok(value) = HeaderValue::from_str(protocol) {
                    headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
                    subprotocol = Some(protocol.to_string());
                }
            }
        }

        for name in &WEBSOCKET_DIAL_HEADERS {
            headers.remove(name);
        }

        if let Some(origin) = &self.backend_origin {
            headers.insert(ORIGIN, origin.clone());
        }

        if let Some(token) = bearer_token(query) {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Ignoring token query parameter with invalid characters"),
            }
        }

        UpgradeHeaders {
            headers,
            subprotocol,
        }
    }
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self::new(
            vec![HeaderName::from_static("x-csrftoken")],
            Some(HeaderValue::from_static("http://localhost")),
        )
    }
}

/// Header set for a backend dial plus the subprotocol selected from the client's offer.
#[derive(Debug, Clone)]
pub struct UpgradeHeaders {
    pub headers: HeaderMap,
    pub subprotocol: Option<String>,
}

/// First non-empty `token` query parameter, percent-decoded.
pub fn bearer_token(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

/// Whether any `Upgrade` value asks for a WebSocket.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(UPGRADE)
        .iter()
        .any(|value| value.as_bytes().eq_ignore_ascii_case(b"websocket"))
}

/// Strip hop-by-hop headers from a backend response before it reaches the client.
pub fn filter_response_headers(headers: &mut HeaderMap) {
    for name in &RESPONSE_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Strip hop-by-hop headers from a request before it is forwarded.
///
/// Headers named in `Connection` are hop-by-hop too and go with it.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(REQUEST_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}
