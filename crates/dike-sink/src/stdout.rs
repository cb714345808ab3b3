//! The `stdout` sink: every received event becomes one structured log line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dike_core::{
    AdapterConfig, AdapterError, AuditEvent, Context, ProcessError, ProcessFn, Sink, Stage,
};
use tracing::{debug, info, warn, Span};

/// Name the sink is registered under.
pub const NAME: &str = "stdout";

/// Logs each audit event as JSON through `tracing`.
#[derive(Debug, Default)]
pub struct StdoutSink {
    span: Option<Span>,
    stopped: Arc<AtomicBool>,
}

impl StdoutSink {
    /// Creates a new stdout sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn log_event(event: &AuditEvent) -> Result<(), ProcessError> {
    let json = serde_json::to_string(event).map_err(|e| ProcessError::sink(NAME, e))?;

    match event.stage {
        Some(Stage::Panic) => warn!(audit_event = %json, "Audit event"),
        _ => info!(audit_event = %json, "Audit event"),
    }
    Ok(())
}

#[async_trait]
impl Sink for StdoutSink {
    fn setup(&mut self, span: Span, config: &AdapterConfig) -> Result<ProcessFn, AdapterError> {
        if !config.is_empty() {
            warn!(parent: &span, "stdout sink takes no configuration, ignoring it");
        }

        let stopped = Arc::clone(&self.stopped);
        let process_span = span.clone();
        self.span = Some(span);

        Ok(ProcessFn::new(move |ctx: Context, batch| {
            let stopped = Arc::clone(&stopped);
            let span = process_span.clone();
            async move {
                if stopped.load(Ordering::Acquire) {
                    return Err(ProcessError::sink(NAME, "sink is stopped"));
                }
                span.in_scope(|| {
                    for event in batch.iter() {
                        if ctx.is_done() {
                            return Err(ProcessError::Cancelled);
                        }
                        log_event(event)?;
                    }
                    Ok(())
                })
            }
        }))
    }

    async fn start(&mut self, _ctx: &Context) -> Result<(), AdapterError> {
        let span = self.span.as_ref().ok_or(AdapterError::NotSetUp)?;
        debug!(parent: span, "stdout sink started");
        Ok(())
    }

    async fn stop(&mut self, _ctx: &Context) -> Result<(), AdapterError> {
        self.stopped.store(true, Ordering::Release);
        if let Some(span) = &self.span {
            debug!(parent: span, "stdout sink stopped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dike_core::EventList;

    fn batch(n: usize) -> dike_core::EventBatch {
        EventList::new(
            (0..n)
                .map(|i| AuditEvent {
                    audit_id: Some(format!("event-{i}")),
                    stage: Some(Stage::ResponseComplete),
                    ..AuditEvent::default()
                })
                .collect(),
        )
        .into_batch()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut sink = StdoutSink::new();
        let process = sink.setup(Span::none(), &AdapterConfig::empty()).unwrap();
        sink.start(&Context::background()).await.unwrap();

        process.call(Context::background(), batch(3)).await.unwrap();
        process.call(Context::background(), batch(0)).await.unwrap();

        sink.stop(&Context::background()).await.unwrap();
        let err = process
            .call(Context::background(), batch(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Sink { .. }));
    }

    #[tokio::test]
    async fn test_start_before_setup() {
        let mut sink = StdoutSink::new();
        assert!(matches!(
            sink.start(&Context::background()).await,
            Err(AdapterError::NotSetUp)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let mut sink = StdoutSink::new();
        let process = sink.setup(Span::none(), &AdapterConfig::empty()).unwrap();

        let ctx = Context::background();
        ctx.cancel();
        let err = process.call(ctx, batch(2)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
    }

    #[test]
    fn test_log_event() {
        let event = AuditEvent {
            stage: Some(Stage::Panic),
            ..AuditEvent::default()
        };
        log_event(&event).unwrap();
    }
}
