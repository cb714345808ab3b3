//! Pipeline configuration.
//!
//! ```yaml
//! shutdown_timeout_secs: 10
//! inputs:
//!   audit:
//!     listen_addr: ":8443"
//!     tls_cert_file: /etc/dike/tls.crt
//!     tls_key_file: /etc/dike/tls.key
//! sinks:
//!   stdout: {}
//! ```
//!
//! Each adapter section is handed to its adapter verbatim as an
//! [`AdapterConfig`]; adapters without a section receive an empty blob.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterConfig, AdapterKind};
use crate::error::{Error, Result};

/// Default global shutdown budget.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of a whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Budget for stopping every adapter, in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Per-input configuration sections.
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_yaml::Value>,

    /// Per-sink configuration sections.
    #[serde(default)]
    pub sinks: BTreeMap<String, serde_yaml::Value>,
}

const fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT.as_secs()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            inputs: BTreeMap::new(),
            sinks: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// The global shutdown budget.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Serialized configuration for one adapter, empty if it has no section.
    pub fn adapter_config(&self, kind: AdapterKind, name: &str) -> Result<AdapterConfig> {
        let sections = match kind {
            AdapterKind::Input => &self.inputs,
            AdapterKind::Sink => &self.sinks,
        };
        match sections.get(name) {
            None | Some(serde_yaml::Value::Null) => Ok(AdapterConfig::empty()),
            Some(value) => Ok(AdapterConfig::from(serde_yaml::to_string(value)?.into_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert!(config.inputs.is_empty());
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(PipelineConfig::from_yaml("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_adapter_sections() {
        let config = PipelineConfig::from_yaml(
            r#"
shutdown_timeout_secs: 3
inputs:
  audit:
    listen_addr: ":9443"
    require_client_auth: true
sinks:
  stdout:
"#,
        )
        .unwrap();

        assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));

        let audit = config.adapter_config(AdapterKind::Input, "audit").unwrap();
        let value: serde_yaml::Value = serde_yaml::from_slice(audit.as_bytes()).unwrap();
        assert_eq!(value["listen_addr"], serde_yaml::Value::from(":9443"));
        assert_eq!(value["require_client_auth"], serde_yaml::Value::from(true));

        assert!(config
            .adapter_config(AdapterKind::Sink, "stdout")
            .unwrap()
            .is_empty());
        assert!(config
            .adapter_config(AdapterKind::Sink, "missing")
            .unwrap()
            .is_empty());
        assert!(config
            .adapter_config(AdapterKind::Input, "stdout")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "shutdown_timeout_secs: 7").unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.shutdown_timeout_secs, 7);
    }

    #[test]
    fn test_from_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/dike.yaml").unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
        assert!(err.to_string().contains("/nonexistent/dike.yaml"));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = PipelineConfig::from_yaml("shutdown_timeout_secs: soon").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
