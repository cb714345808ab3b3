//! # Dike Sinks
//!
//! Output adapters for the Dike pipeline.
//!
//! - [`StdoutSink`] logs every received audit event as a JSON field of a
//!   `tracing` event; registered as `stdout`.
//! - [`MemorySink`] records batches in memory and exposes them through a
//!   [`MemoryHandle`]. It is not registered by default.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod memory;
pub mod stdout;

pub use memory::{MemoryHandle, MemorySink};
pub use stdout::StdoutSink;

use dike_core::{Sink, SinkDescriptor, SinkRegistry};

/// Registers the default sinks.
pub fn register(registry: &SinkRegistry) {
    registry.register(SinkDescriptor::new(stdout::NAME, || {
        Box::new(StdoutSink::new()) as Box<dyn Sink>
    }));
}
