//! Origin checks for client WebSocket upgrades.

use axum::http::Uri;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginRejection {
    #[error("no Origin header on the request")]
    Missing,
    #[error("configured origin '{0}' is not a URL with a host")]
    BadConfigured(String),
    #[error("malformed Origin header '{0}'")]
    Malformed(String),
    #[error("origin '{offered}' does not match '{configured}'")]
    Mismatch { configured: String, offered: String },
}

/// Host of an origin URL with any port dropped, exactly as written.
fn origin_host(origin: &str) -> Option<String> {
    let uri: Uri = origin.parse().ok()?;
    uri.scheme()?;
    uri.host().filter(|host| !host.is_empty()).map(str::to_string)
}

/// Validates the `Origin` of an upgrade request against the configured origin.
///
/// - An empty `configured` origin allows everything.
/// - Otherwise the request must carry an `Origin` whose host equals the configured
///   host, byte for byte. Ports are ignored so that load balancers remapping ports
///   do not break the check.
pub fn check(request_origin: Option<&str>, configured: &str) -> Result<(), OriginRejection> {
    if configured.is_empty() {
        return Ok(());
    }

    let offered = request_origin.ok_or(OriginRejection::Missing)?;

    let configured_host = origin_host(configured)
        .ok_or_else(|| OriginRejection::BadConfigured(configured.to_string()))?;
    let offered_host =
        origin_host(offered).ok_or_else(|| OriginRejection::Malformed(offered.to_string()))?;

    if configured_host == offered_host {
        Ok(())
    } else {
        Err(OriginRejection::Mismatch {
            configured: configured.to_string(),
            offered: offered.to_string(),
        })
    }
}

/// Boolean form of [`check`].
pub fn is_allowed(request_origin: Option<&str>, configured: &str) -> bool {
    check(request_origin, configured).is_ok()
}
