//! TLS and mutual-TLS server configuration, and the per-connection handshake.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dike_core::AdapterError;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::config::WebhookConfig;

/// Bound on a single TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the rustls server configuration, or `None` for plain HTTP.
pub fn server_config(config: &WebhookConfig) -> Result<Option<Arc<ServerConfig>>, AdapterError> {
    let Some(cert_path) = config.cert_file() else {
        if config.require_client_auth {
            return Err(AdapterError::Tls(
                "require_client_auth needs tls_cert_file and tls_key_file".to_string(),
            ));
        }
        return Ok(None);
    };
    let key_path = config
        .key_file()
        .ok_or_else(|| AdapterError::Tls("tls_cert_file is set but tls_key_file is not".to_string()))?;

    // rustls 0.23 needs a process-wide provider; another crate may have installed one already.
    let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let builder = ServerConfig::builder();
    let builder = if config.require_client_auth {
        let roots = client_roots(config)?;
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| AdapterError::Tls(format!("could not build client verifier: {e}")))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let mut server_config = builder.with_single_cert(certs, key).map_err(|e| {
        AdapterError::Tls(format!(
            "while loading cert and key {}, {}: {e}",
            cert_path.display(),
            key_path.display()
        ))
    })?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Some(Arc::new(server_config)))
}

fn read_file(path: &Path) -> Result<Vec<u8>, AdapterError> {
    std::fs::read(path).map_err(|e| AdapterError::io(path.display().to_string(), e))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, AdapterError> {
    let pem = read_file(path)?;
    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<_, _>>()
        .map_err(|e| {
            AdapterError::Tls(format!("failed to parse certificates in {}: {e}", path.display()))
        })?;

    if certs.is_empty() {
        return Err(AdapterError::Tls(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, AdapterError> {
    let pem = read_file(path)?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|e| {
        AdapterError::Tls(format!("failed to parse private key in {}: {e}", path.display()))
    })
}

/// Trust pool for client certificates: optionally the system roots, plus
/// every parsable certificate of the CA file.
fn client_roots(config: &WebhookConfig) -> Result<RootCertStore, AdapterError> {
    let mut roots = RootCertStore::empty();

    if config.use_system_roots {
        let native = rustls_native_certs::load_native_certs();
        if native.certs.is_empty() {
            if let Some(e) = native.errors.first() {
                return Err(AdapterError::Tls(format!("could not get system cert pool: {e}")));
            }
        }
        for e in &native.errors {
            warn!(error = %e, "skipping unreadable system certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!(added, ignored, "loaded system roots");
    }

    if let Some(ca_path) = config.ca_file() {
        let pem = read_file(ca_path)?;
        let certs = CertificateDer::pem_slice_iter(&pem).filter_map(Result::ok);
        let (added, ignored) = roots.add_parsable_certificates(certs);
        debug!(added, ignored, path = %ca_path.display(), "loaded client CA file");
    }

    if roots.is_empty() {
        return Err(AdapterError::Tls(
            "client authentication is required but the trust pool is empty".to_string(),
        ));
    }
    Ok(roots)
}

/// Performs server-side TLS handshakes with a bounded duration.
///
/// Each accepted connection is handshaken in its own task, so a peer that
/// never sends a `ClientHello` only holds its own connection.
#[derive(Clone)]
pub struct Handshaker {
    acceptor: TlsAcceptor,
    timeout: Duration,
}

impl Handshaker {
    /// Creates a handshaker using [`HANDSHAKE_TIMEOUT`].
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
            timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Overrides the handshake timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Completes the handshake, or returns `None` if it fails or times out.
    pub async fn accept(&self, stream: TcpStream, addr: SocketAddr) -> Option<TlsStream<TcpStream>> {
        match tokio::time::timeout(self.timeout, self.acceptor.accept(stream)).await {
            Ok(Ok(tls)) => Some(tls),
            Ok(Err(e)) => {
                debug!(error = %e, %addr, "TLS handshake failed");
                None
            }
            Err(_) => {
                debug!(%addr, "TLS handshake timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    use rcgen::{CertificateParams, KeyPair};
    use tempfile::TempDir;

    struct Files {
        _dir: TempDir,
        cert: PathBuf,
        key: PathBuf,
    }

    fn self_signed() -> Files {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("tls.crt");
        let key_path = dir.path().join("tls.key");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        Files {
            _dir: dir,
            cert: cert_path,
            key: key_path,
        }
    }

    fn https(files: &Files) -> WebhookConfig {
        WebhookConfig {
            tls_cert_file: Some(files.cert.clone()),
            tls_key_file: Some(files.key.clone()),
            ..WebhookConfig::default()
        }
    }

    #[test]
    fn test_plain_http() {
        assert!(server_config(&WebhookConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_https() {
        let files = self_signed();
        let config = server_config(&https(&files)).unwrap().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_client_auth_requires_https() {
        let config = WebhookConfig {
            require_client_auth: true,
            ..WebhookConfig::default()
        };
        assert!(matches!(server_config(&config), Err(AdapterError::Tls(_))));
    }

    #[test]
    fn test_missing_key_path() {
        let files = self_signed();
        let config = WebhookConfig {
            tls_key_file: None,
            ..https(&files)
        };
        assert!(matches!(server_config(&config), Err(AdapterError::Tls(_))));
    }

    #[test]
    fn test_unreadable_cert_file() {
        let files = self_signed();
        let config = WebhookConfig {
            tls_cert_file: Some(PathBuf::from("/nonexistent/tls.crt")),
            ..https(&files)
        };
        let err = server_config(&config).unwrap_err();
        assert!(matches!(err, AdapterError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/tls.crt"));
    }

    #[test]
    fn test_cert_file_without_certificates() {
        let files = self_signed();
        let mut empty = tempfile::NamedTempFile::new().unwrap();
        writeln!(empty, "not a certificate").unwrap();
        let config = WebhookConfig {
            tls_cert_file: Some(empty.path().to_path_buf()),
            ..https(&files)
        };
        let err = server_config(&config).unwrap_err();
        assert!(err.to_string().contains("no certificate"));
    }

    #[test]
    fn test_key_file_without_key() {
        let files = self_signed();
        let config = WebhookConfig {
            tls_key_file: Some(files.cert.clone()),
            ..https(&files)
        };
        let err = server_config(&config).unwrap_err();
        assert!(err.to_string().contains("failed to parse private key"));
    }

    #[test]
    fn test_client_auth_with_ca_file() {
        let files = self_signed();
        let config = WebhookConfig {
            require_client_auth: true,
            client_auth_ca_file: Some(files.cert.clone()),
            ..https(&files)
        };
        assert!(server_config(&config).unwrap().is_some());
    }

    #[test]
    fn test_client_auth_skips_garbage_blocks() {
        let files = self_signed();
        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        writeln!(bundle, "-----BEGIN CERTIFICATE-----\nZ2FyYmFnZQ==\n-----END CERTIFICATE-----").unwrap();
        bundle
            .write_all(&std::fs::read(&files.cert).unwrap())
            .unwrap();

        let config = WebhookConfig {
            require_client_auth: true,
            client_auth_ca_file: Some(bundle.path().to_path_buf()),
            ..https(&files)
        };
        assert!(server_config(&config).unwrap().is_some());
    }

    #[test]
    fn test_client_auth_empty_pool() {
        let files = self_signed();
        let mut empty = tempfile::NamedTempFile::new().unwrap();
        writeln!(empty, "# no certificates here").unwrap();
        let config = WebhookConfig {
            require_client_auth: true,
            client_auth_ca_file: Some(empty.path().to_path_buf()),
            ..https(&files)
        };
        let err = server_config(&config).unwrap_err();
        assert!(err.to_string().contains("trust pool is empty"));
    }

    #[test]
    fn test_client_auth_unreadable_ca_file() {
        let files = self_signed();
        let config = WebhookConfig {
            require_client_auth: true,
            client_auth_ca_file: Some(PathBuf::from("/nonexistent/ca.crt")),
            ..https(&files)
        };
        assert!(matches!(
            server_config(&config),
            Err(AdapterError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_handshake_gives_up_on_silent_peer() {
        let files = self_signed();
        let config = server_config(&https(&files)).unwrap().unwrap();
        let handshaker = Handshaker::new(config).with_timeout(Duration::from_millis(200));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let _silent = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, addr) = listener.accept().await.unwrap();

        let started = std::time::Instant::now();
        assert!(handshaker.accept(stream, addr).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
