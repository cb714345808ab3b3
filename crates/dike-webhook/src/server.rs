//! The HTTP(S) server task owned by the webhook input.
//!
//! Every accepted connection runs in its own task: the TLS handshake, the
//! HTTP/1.1 exchange and the connection timeouts never hold up the accept
//! loop or other clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use dike_core::{AdapterError, Context};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_rustls::rustls::ServerConfig;
use tower::ServiceExt;
use tracing::{debug, error, info, Instrument};

use crate::config::WebhookConfig;
use crate::conn::{Activity, TimedIo};
use crate::tls::Handshaker;

/// Pause after a failed `accept`, e.g. when file descriptors run out.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Connection handling knobs.
#[derive(Clone)]
pub struct ServerOptions {
    /// Terminate TLS with this configuration.
    pub tls: Option<Arc<ServerConfig>>,
    /// Close connections whose request headers take longer than this.
    pub read_header_timeout: Option<Duration>,
    /// Close keep-alive connections with no traffic for this long.
    pub idle_timeout: Option<Duration>,
    /// Fail a response write that makes no progress for this long.
    pub write_timeout: Option<Duration>,
    /// Drain budget once the server is cancelled.
    pub grace: Duration,
}

impl ServerOptions {
    /// Options from the adapter configuration.
    #[must_use]
    pub fn new(config: &WebhookConfig, tls: Option<Arc<ServerConfig>>) -> Self {
        Self {
            tls,
            read_header_timeout: config.read_header_timeout(),
            idle_timeout: config.idle_timeout(),
            write_timeout: config.write_timeout(),
            grace: config.shutdown_grace(),
        }
    }
}

/// Serves `router` on `listener` until `ctx` is done.
///
/// Requests see the peer address as `ConnectInfo<SocketAddr>` over both HTTP
/// and HTTPS. Once `ctx` is done the listener is closed, idle connections are
/// closed and in-flight requests get `options.grace` to finish before the
/// remaining connections are aborted.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    ctx: Context,
    options: ServerOptions,
) -> Result<(), AdapterError> {
    let handshaker = options.tls.clone().map(Handshaker::new);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = ctx.done() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let connection = Connection {
                        remote,
                        router: router.clone(),
                        shutdown: ctx.clone(),
                        options: options.clone(),
                    };
                    connections.spawn(
                        connection
                            .run(stream, handshaker.clone())
                            .in_current_span(),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    info!("Shutting down HTTP server");

    let drained = tokio::time::timeout(options.grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_ok() {
        info!("HTTP server stopped");
        Ok(())
    } else {
        connections.abort_all();
        error!(grace = ?options.grace, "HTTP server did not drain in time, closing connections");
        Err(AdapterError::Timeout {
            operation: "HTTP server shutdown",
            timeout: options.grace,
        })
    }
}

struct Connection {
    remote: SocketAddr,
    router: Router,
    shutdown: Context,
    options: ServerOptions,
}

impl Connection {
    async fn run(self, stream: TcpStream, handshaker: Option<Handshaker>) {
        let Some(handshaker) = handshaker else {
            self.drive(stream).await;
            return;
        };

        let tls = tokio::select! {
            tls = handshaker.accept(stream, self.remote) => tls,
            () = self.shutdown.done() => None,
        };
        if let Some(tls) = tls {
            self.drive(tls).await;
        }
    }

    async fn drive<I>(self, io: I)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            remote,
            router,
            shutdown,
            options,
        } = self;

        let activity = Activity::new();
        let io = TimedIo::new(io, activity.clone(), options.write_timeout);
        let service = service_fn(move |mut req: Request<Incoming>| {
            req.extensions_mut().insert(ConnectInfo(remote));
            router.clone().oneshot(req)
        });

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(options.read_header_timeout)
            .keep_alive(true);
        let conn = builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            let idle_deadline = options.idle_timeout.map(|idle| activity.last() + idle);
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        debug!(error = %e, %remote, "Connection closed with error");
                    }
                    return;
                }
                () = shutdown.done(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                () = tokio::time::sleep_until(idle_deadline.unwrap_or_else(Instant::now)),
                    if !draining && idle_deadline.is_some() =>
                {
                    let idle = options
                        .idle_timeout
                        .is_some_and(|idle| activity.last() + idle <= Instant::now());
                    if idle {
                        debug!(%remote, "Closing idle connection");
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        }
    }
}
