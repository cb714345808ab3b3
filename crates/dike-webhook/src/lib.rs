//! # Dike Webhook
//!
//! Kubernetes audit webhook input for the Dike pipeline.
//!
//! The adapter runs an HTTP server (HTTPS when a certificate is configured,
//! optionally requiring client certificates) that accepts `EventList`
//! payloads on any method and path and hands each list's items, as one batch,
//! to the pipeline's fan-out.
//!
//! ```rust,ignore
//! let registries = dike_core::Registries::new();
//! dike_webhook::register(&registries.inputs);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod conn;
pub mod handler;
pub mod input;
pub mod server;
pub mod tls;

pub use config::WebhookConfig;
pub use handler::{router, ReceiverState, WebhookResponse};
pub use input::WebhookInput;
pub use server::{serve, ServerOptions};

use dike_core::{Input, InputDescriptor, InputRegistry};

/// Name the webhook input is registered under.
pub const NAME: &str = "audit";

/// Registers the webhook input under [`NAME`].
pub fn register(registry: &InputRegistry) {
    registry.register(InputDescriptor::new(NAME, || {
        Box::new(WebhookInput::new()) as Box<dyn Input>
    }));
}
