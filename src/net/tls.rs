//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::{ClientConfig, RootCertStore};

/// Error building the outbound TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read CA bundle {path}: {source}")]
    CaBundle {
        path: String,
        source: std::io::Error,
    },
    #[error("CA bundle {0} contains no certificates")]
    EmptyCaBundle(String),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    // Basic validation
    if !cert_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Build the client TLS configuration used to reach the backend.
///
/// Trusts the webpki roots plus every certificate in `ca_path`, if given.
/// Shared by the plain HTTP client and the WebSocket dialer.
pub fn client_config(ca_path: Option<&Path>) -> Result<Arc<ClientConfig>, TlsError> {
    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    if let Some(path) = ca_path {
        let shown = path.display().to_string();
        let file = File::open(path).map_err(|source| TlsError::CaBundle {
            path: shown.clone(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TlsError::CaBundle {
                path: shown.clone(),
                source,
            })?;
        if certs.is_empty() {
            return Err(TlsError::EmptyCaBundle(shown));
        }
        let (added, ignored) = roots.add_parsable_certificates(certs);
        tracing::info!(path = %shown, added, ignored, "Loaded backend CA bundle");
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}
