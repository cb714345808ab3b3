//! The `audit` webhook input adapter.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dike_core::{AdapterConfig, AdapterError, Context, Input, ProcessFn};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::ServerConfig;
use tracing::{info, warn, Instrument, Span};

use crate::config::WebhookConfig;
use crate::handler::{router, ReceiverState};
use crate::server::{self, ServerOptions};
use crate::tls;

struct Running {
    ctx: Context,
    local_addr: SocketAddr,
    task: JoinHandle<Result<(), AdapterError>>,
}

/// Receives Kubernetes audit webhooks over HTTP or HTTPS.
pub struct WebhookInput {
    span: Span,
    config: WebhookConfig,
    tls: Option<Arc<ServerConfig>>,
    process: Option<ProcessFn>,
    running: Option<Running>,
}

impl Default for WebhookInput {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WebhookInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookInput")
            .field("config", &self.config)
            .field("tls", &self.tls.is_some())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl WebhookInput {
    /// Creates an adapter that still needs [`Input::setup`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            span: Span::none(),
            config: WebhookConfig::default(),
            tls: None,
            process: None,
            running: None,
        }
    }

    /// The decoded configuration.
    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// The bound address while the server runs.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Whether the server terminates TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

#[async_trait]
impl Input for WebhookInput {
    fn setup(
        &mut self,
        span: Span,
        process: ProcessFn,
        config: &AdapterConfig,
    ) -> Result<(), AdapterError> {
        let config: WebhookConfig = config.decode()?;
        let tls = span.in_scope(|| tls::server_config(&config))?;

        self.span = span;
        self.config = config;
        self.tls = tls;
        self.process = Some(process);
        Ok(())
    }

    async fn start(&mut self, ctx: &Context) -> Result<(), AdapterError> {
        let process = self.process.clone().ok_or(AdapterError::NotSetUp)?;
        if self.running.is_some() {
            return Err(AdapterError::Task("webhook server already started".to_string()));
        }

        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AdapterError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AdapterError::Bind { addr, source })?;

        info!(
            parent: &self.span,
            %local_addr,
            tls = self.tls.is_some(),
            require_client_auth = self.config.require_client_auth,
            "Starting HTTP server"
        );

        let app = router(ReceiverState::new(process, self.span.clone(), &self.config));
        let server_ctx = ctx.with_cancel();
        let task = tokio::spawn(
            server::serve(
                listener,
                app,
                server_ctx.clone(),
                ServerOptions::new(&self.config, self.tls.clone()),
            )
            .instrument(self.span.clone()),
        );

        self.running = Some(Running {
            ctx: server_ctx,
            local_addr,
            task,
        });
        Ok(())
    }

    async fn stop(&mut self, ctx: &Context) -> Result<(), AdapterError> {
        let Some(Running {
            ctx: server_ctx,
            mut task,
            ..
        }) = self.running.take()
        else {
            return Ok(());
        };

        server_ctx.cancel();

        tokio::select! {
            joined = &mut task => {
                joined.unwrap_or_else(|e| Err(AdapterError::Task(e.to_string())))
            }
            () = ctx.done() => {
                warn!(parent: &self.span, "stop deadline reached before the HTTP server exited");
                task.abort();
                Err(AdapterError::Task(
                    "HTTP server still running when the stop deadline elapsed".to_string(),
                ))
            }
        }
    }
}
