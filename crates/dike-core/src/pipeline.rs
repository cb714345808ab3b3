//! Pipeline composition and coordinated shutdown.
//!
//! Sinks are set up and started before any input, because every input's
//! processing function is the fan-out over the sinks' processing functions.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn};

use crate::adapter::{AdapterKind, Input, Sink};
use crate::config::PipelineConfig;
use crate::context::Context;
use crate::error::{AdapterError, Error, Result};
use crate::process::ProcessFn;
use crate::registry::Registries;

type StopFuture<'a> =
    BoxFuture<'a, (AdapterKind, &'a str, std::result::Result<(), AdapterError>)>;

struct Active<T: ?Sized> {
    name: String,
    adapter: Box<T>,
}

/// Outcome of [`Pipeline::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Adapters that stopped cleanly.
    pub stopped: usize,
    /// Adapters whose Stop returned an error.
    pub failed: usize,
    /// Adapters still stopping when the deadline elapsed.
    pub abandoned: usize,
    /// Whether the global deadline elapsed.
    pub timed_out: bool,
}

impl ShutdownSummary {
    /// Returns true if every adapter stopped cleanly.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0 && !self.timed_out
    }
}

/// A running set of inputs and sinks.
pub struct Pipeline {
    inputs: Vec<Active<dyn Input>>,
    sinks: Vec<Active<dyn Sink>>,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("inputs", &self.input_names())
            .field("sinks", &self.sink_names())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl Pipeline {
    /// Instantiates, sets up and starts every registered sink, then every
    /// registered input bound to the fan-out over the sinks.
    ///
    /// `ctx` is the root context; adapters tie their background work to it.
    /// The first Setup or Start failure aborts composition.
    pub async fn compose(
        registries: &Registries,
        config: &PipelineConfig,
        ctx: &Context,
    ) -> Result<Self> {
        let mut sinks: Vec<Active<dyn Sink>> = Vec::new();
        let mut process_fns = Vec::new();

        for (name, descriptor) in registries.sinks.adapters() {
            let adapter_config = config.adapter_config(AdapterKind::Sink, &name)?;
            let mut sink = descriptor.instantiate();

            let process = sink
                .setup(info_span!("sink", adapter = %name), &adapter_config)
                .map_err(|source| Error::Setup {
                    kind: AdapterKind::Sink,
                    name: name.clone(),
                    source,
                })?;
            sink.start(ctx).await.map_err(|source| Error::Start {
                kind: AdapterKind::Sink,
                name: name.clone(),
                source,
            })?;

            info!(adapter = %name, "sink started");
            sinks.push(Active { name, adapter: sink });
            process_fns.push(process);
        }

        let fan_out = ProcessFn::fan_out(process_fns);
        let mut inputs: Vec<Active<dyn Input>> = Vec::new();

        for (name, descriptor) in registries.inputs.adapters() {
            let adapter_config = config.adapter_config(AdapterKind::Input, &name)?;
            let mut input = descriptor.instantiate();

            input
                .setup(
                    info_span!("input", adapter = %name),
                    fan_out.clone(),
                    &adapter_config,
                )
                .map_err(|source| Error::Setup {
                    kind: AdapterKind::Input,
                    name: name.clone(),
                    source,
                })?;
            input.start(ctx).await.map_err(|source| Error::Start {
                kind: AdapterKind::Input,
                name: name.clone(),
                source,
            })?;

            info!(adapter = %name, "input started");
            inputs.push(Active {
                name,
                adapter: input,
            });
        }

        if inputs.is_empty() {
            warn!("no input adapters registered, pipeline will receive nothing");
        }

        Ok(Self {
            inputs,
            sinks,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Names of the running inputs.
    #[must_use]
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|a| a.name.as_str()).collect()
    }

    /// Names of the running sinks.
    #[must_use]
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|a| a.name.as_str()).collect()
    }

    /// The global shutdown budget.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Overrides the global shutdown budget.
    pub fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout = timeout;
    }

    /// Waits for `ctx` to be done, then shuts the pipeline down.
    pub async fn run_until_cancelled(self, ctx: &Context) -> ShutdownSummary {
        ctx.done().await;
        info!("Shutting down");
        let summary = self.shutdown().await;
        info!(
            stopped = summary.stopped,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "Shutdown complete"
        );
        summary
    }

    /// Stops every input and sink concurrently under one deadline.
    ///
    /// Stop errors are logged, never propagated. Returns once every adapter
    /// has stopped or the deadline elapsed, whichever comes first.
    pub async fn shutdown(mut self) -> ShutdownSummary {
        let timeout = self.shutdown_timeout;
        let ctx = Context::background().with_timeout(timeout);

        let inputs = self.inputs.iter_mut().map(|Active { name, adapter }| {
            let ctx = &ctx;
            async move { (AdapterKind::Input, name.as_str(), adapter.stop(ctx).await) }.boxed()
        });
        let sinks = self.sinks.iter_mut().map(|Active { name, adapter }| {
            let ctx = &ctx;
            async move { (AdapterKind::Sink, name.as_str(), adapter.stop(ctx).await) }.boxed()
        });

        let mut pending: FuturesUnordered<StopFuture<'_>> = inputs.chain(sinks).collect();
        let mut summary = ShutdownSummary::default();

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((kind, name, Ok(()))) => {
                        debug!(%kind, adapter = %name, "adapter stopped");
                        summary.stopped += 1;
                    }
                    Some((kind, name, Err(e))) => {
                        error!(%kind, adapter = %name, error = %e, "could not stop adapter");
                        summary.failed += 1;
                    }
                    None => break,
                },
                () = &mut deadline => {
                    summary.timed_out = true;
                    summary.abandoned = pending.len();
                    warn!(
                        timeout = ?timeout,
                        abandoned = summary.abandoned,
                        "shutdown deadline elapsed"
                    );
                    break;
                }
            }
        }

        summary
    }
}
