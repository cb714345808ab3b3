//! Error types for the Dike pipeline.
//!
//! Three layers of errors exist:
//! - [`Error`]: composition and configuration failures seen by the orchestrator.
//! - [`AdapterError`]: failures raised by an individual input or sink.
//! - [`ProcessError`]: failures of a processing function while delivering a batch.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::adapter::AdapterKind;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error for adapter-specific failures that have no dedicated variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while composing or configuring a pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// An adapter failed during Setup.
    #[error("could not set up {kind} '{name}': {source}")]
    Setup {
        /// Whether the adapter is an input or a sink.
        kind: AdapterKind,
        /// Registered adapter name.
        name: String,
        /// Underlying adapter error.
        #[source]
        source: AdapterError,
    },

    /// An adapter failed during Start.
    #[error("could not start {kind} '{name}': {source}")]
    Start {
        /// Whether the adapter is an input or a sink.
        kind: AdapterKind,
        /// Registered adapter name.
        name: String,
        /// Underlying adapter error.
        #[source]
        source: AdapterError,
    },

    /// The pipeline configuration file could not be read.
    #[error("failed to read configuration from {path}: {source}")]
    ConfigRead {
        /// Path to the configuration file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The pipeline configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

/// Errors raised by input and sink adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The adapter configuration blob could not be decoded.
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),

    /// A file referenced by the configuration could not be read.
    #[error("while reading {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded or assembled.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The listener could not bind its address.
    #[error("could not listen on {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Start or Stop was called before Setup.
    #[error("adapter has not been set up")]
    NotSetUp,

    /// A background task of the adapter failed.
    #[error("background task failed: {0}")]
    Task(String),

    /// An operation did not finish before its deadline.
    #[error("{operation} did not finish within {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// Adapter-specific error.
    #[error(transparent)]
    Other(BoxError),
}

impl AdapterError {
    /// Wraps an I/O error with the path it relates to.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors returned by a processing function.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A sink rejected or failed to handle the batch.
    #[error("sink '{sink}' failed: {reason}")]
    Sink {
        /// Sink name.
        sink: String,
        /// Failure reason.
        reason: String,
    },

    /// The processing context was cancelled before the batch was handled.
    #[error("processing cancelled")]
    Cancelled,

    /// A sink task panicked or was aborted.
    #[error("sink task did not complete: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error(transparent)]
    Other(BoxError),
}

impl ProcessError {
    /// Creates a sink failure.
    pub fn sink(sink: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Sink {
            sink: sink.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ProcessError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Panicked(err.to_string())
    }
}
