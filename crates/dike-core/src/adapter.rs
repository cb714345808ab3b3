//! Contracts implemented by input and sink adapters.
//!
//! Every adapter instance goes through the same lifecycle: configured once
//! (`setup`), started once (`start`), stopped at most once (`stop`). An
//! instance is never reused after `stop`.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::Span;

use crate::context::Context;
use crate::error::AdapterError;
use crate::process::ProcessFn;

/// Which family an adapter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Receives events from the outside world.
    Input,
    /// Delivers events somewhere.
    Sink,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Sink => f.write_str("sink"),
        }
    }
}

/// Serialized adapter configuration.
///
/// The pipeline never looks inside; the schema belongs to the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterConfig(Vec<u8>);

impl AdapterConfig {
    /// An empty configuration.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns true if the blob holds nothing but whitespace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(u8::is_ascii_whitespace)
    }

    /// Decodes the blob as YAML (which also accepts JSON).
    ///
    /// An empty blob yields `T::default()`.
    pub fn decode<T>(&self) -> Result<T, AdapterError>
    where
        T: DeserializeOwned + Default,
    {
        if self.is_empty() {
            return Ok(T::default());
        }
        serde_yaml::from_slice(&self.0).map_err(|e| AdapterError::InvalidConfig(e.to_string()))
    }
}

impl From<Vec<u8>> for AdapterConfig {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for AdapterConfig {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// An output adapter.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Reads configuration, checks dependencies and returns the processing
    /// function that delivers batches to this sink.
    ///
    /// `span` identifies the adapter in logs.
    fn setup(&mut self, span: Span, config: &AdapterConfig) -> Result<ProcessFn, AdapterError>;

    /// Starts the sink. Must not block on long-running work.
    async fn start(&mut self, ctx: &Context) -> Result<(), AdapterError>;

    /// Stops accepting events and flushes what it can before `ctx` is done.
    async fn stop(&mut self, ctx: &Context) -> Result<(), AdapterError>;
}

/// An input adapter.
#[async_trait]
pub trait Input: Send + Sync {
    /// Reads configuration and binds `process`, which the input invokes for
    /// every batch it receives.
    fn setup(
        &mut self,
        span: Span,
        process: ProcessFn,
        config: &AdapterConfig,
    ) -> Result<(), AdapterError>;

    /// Starts listening for events. Must not block; background work is
    /// spawned and owned by the adapter and tied to `ctx`.
    async fn start(&mut self, ctx: &Context) -> Result<(), AdapterError>;

    /// Stops accepting events and waits for background work before `ctx` is done.
    async fn stop(&mut self, ctx: &Context) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        listen_addr: String,
        #[serde(default)]
        enabled: bool,
    }

    #[test]
    fn test_empty_config_decodes_to_default() {
        let config = AdapterConfig::empty();
        assert!(config.is_empty());
        assert_eq!(config.decode::<Sample>().unwrap(), Sample::default());

        let whitespace = AdapterConfig::from("  \n");
        assert!(whitespace.is_empty());
        assert_eq!(whitespace.decode::<Sample>().unwrap(), Sample::default());
    }

    #[test]
    fn test_yaml_config() {
        let config = AdapterConfig::from("listen_addr: \":9443\"\nenabled: true\n");
        let sample: Sample = config.decode().unwrap();
        assert_eq!(sample.listen_addr, ":9443");
        assert!(sample.enabled);
    }

    #[test]
    fn test_json_config() {
        let config = AdapterConfig::from(r#"{"listen_addr": "127.0.0.1:1", "enabled": false}"#);
        let sample: Sample = config.decode().unwrap();
        assert_eq!(sample.listen_addr, "127.0.0.1:1");
    }

    #[test]
    fn test_invalid_config() {
        let config = AdapterConfig::from("enabled: [not, a, bool]");
        let err = config.decode::<Sample>().unwrap_err();
        assert!(matches!(err, AdapterError::InvalidConfig(_)));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(AdapterKind::Input.to_string(), "input");
        assert_eq!(AdapterKind::Sink.to_string(), "sink");
    }
}
