//! Webhook adapter configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listen address: port 8080 on all interfaces.
pub const DEFAULT_LISTEN_ADDR: &str = ":8080";

/// Default bound on reading one request body.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time the server gets to drain connections once cancelled.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default bound on reading a request's headers.
pub const DEFAULT_READ_HEADER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of a keep-alive connection with no traffic.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a stalled response write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum accepted body size (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Configuration of the `audit` webhook input.
///
/// ```yaml
/// listen_addr: ":8443"
/// tls_cert_file: /etc/dike/tls.crt
/// tls_key_file: /etc/dike/tls.key
/// require_client_auth: true
/// use_system_roots: false
/// client_auth_ca_file: /etc/dike/clients-ca.crt
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Address to listen on. A leading `:` means every interface.
    pub listen_addr: String,

    /// PEM certificate chain. HTTPS is enabled when set.
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key matching `tls_cert_file`.
    pub tls_key_file: Option<PathBuf>,

    /// Require and verify a client certificate.
    pub require_client_auth: bool,

    /// Seed the client trust pool with the system roots.
    pub use_system_roots: bool,

    /// PEM bundle of additional client CAs.
    pub client_auth_ca_file: Option<PathBuf>,

    /// Bound on reading one request body, in seconds.
    pub read_timeout_secs: u64,

    /// Bound on reading request headers, in seconds. 0 disables it.
    pub read_header_timeout_secs: u64,

    /// Close keep-alive connections after this many idle seconds. 0 disables it.
    pub idle_timeout_secs: u64,

    /// Bound on a stalled response write, in seconds. 0 disables it.
    pub write_timeout_secs: u64,

    /// Connection drain budget after cancellation, in seconds.
    pub shutdown_grace_secs: u64,

    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            tls_cert_file: None,
            tls_key_file: None,
            require_client_auth: false,
            use_system_roots: false,
            client_auth_ca_file: None,
            read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
            read_header_timeout_secs: DEFAULT_READ_HEADER_TIMEOUT.as_secs(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn non_empty(path: Option<&PathBuf>) -> Option<&Path> {
    path.map(PathBuf::as_path)
        .filter(|p| !p.as_os_str().is_empty())
}

impl WebhookConfig {
    /// The address handed to the listener.
    ///
    /// An empty address falls back to the default, and `:port` binds every
    /// interface.
    #[must_use]
    pub fn bind_address(&self) -> String {
        let addr = self.listen_addr.trim();
        let addr = if addr.is_empty() {
            DEFAULT_LISTEN_ADDR
        } else {
            addr
        };
        if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        }
    }

    /// Certificate path, if HTTPS is configured.
    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        non_empty(self.tls_cert_file.as_ref())
    }

    /// Private key path.
    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        non_empty(self.tls_key_file.as_ref())
    }

    /// Client CA bundle path.
    #[must_use]
    pub fn ca_file(&self) -> Option<&Path> {
        non_empty(self.client_auth_ca_file.as_ref())
    }

    /// Whether the server speaks HTTPS.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.cert_file().is_some()
    }

    /// Bound on reading one request body.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Bound on reading request headers.
    #[must_use]
    pub fn read_header_timeout(&self) -> Option<Duration> {
        seconds(self.read_header_timeout_secs)
    }

    /// Idle keep-alive connection lifetime.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        seconds(self.idle_timeout_secs)
    }

    /// Bound on a stalled response write.
    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        seconds(self.write_timeout_secs)
    }

    /// Connection drain budget after cancellation.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
