//! # Dike Core
//!
//! Core types and contracts for the Dike audit event pipeline.
//!
//! Dike ingests Kubernetes audit events through pluggable **inputs**, forwards
//! each batch concurrently to every pluggable **sink**, and coordinates the
//! startup and shutdown of all adapters.
//!
//! This crate provides:
//!
//! - [`AuditEvent`], [`EventList`], [`EventBatch`] - the event model and wire envelope
//! - [`Context`] - cancellation token plus deadline threaded through every async call
//! - [`ProcessFn`] and [`fan_out`] - batch delivery and the concurrent dispatcher
//! - [`Input`] and [`Sink`] - adapter contracts
//! - [`Registries`] - name to factory mappings for inputs and sinks
//! - [`Pipeline`] - composition of registered adapters and bounded shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use dike_core::{Context, Pipeline, PipelineConfig, Registries};
//!
//! let registries = Registries::new();
//! dike_sink::register(&registries.sinks);
//! dike_webhook::register(&registries.inputs);
//!
//! let root = Context::background();
//! let pipeline = Pipeline::compose(&registries, &PipelineConfig::default(), &root).await?;
//! // ... root.cancel() on SIGTERM ...
//! let summary = pipeline.run_until_cancelled(&root).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod process;
pub mod registry;


// Re-export main types at crate root
pub use adapter::{AdapterConfig, AdapterKind, Input, Sink};
pub use config::{PipelineConfig, DEFAULT_SHUTDOWN_TIMEOUT};
pub use context::Context;
pub use error::{AdapterError, BoxError, Error, ProcessError, Result};
pub use event::{AuditEvent, EventBatch, EventList, Level, ObjectReference, Stage, UserInfo};
pub use pipeline::{Pipeline, ShutdownSummary};
pub use process::{fan_out, ProcessFn, ProcessFuture};
pub use registry::{
    Descriptor, InputDescriptor, InputRegistry, Registries, Registry, SinkDescriptor,
    SinkRegistry,
};
