//! In-memory sink, for embedders and tests.

use std::sync::Arc;

use async_trait::async_trait;
use dike_core::{
    AdapterConfig, AdapterError, AuditEvent, Context, EventBatch, ProcessError, ProcessFn, Sink,
};
use parking_lot::Mutex;
use tracing::{debug, Span};

/// Name used in errors raised by the in-memory sink.
pub const NAME: &str = "memory";

#[derive(Debug, Default)]
struct Recorded {
    batches: Vec<EventBatch>,
    reject: Option<String>,
}

/// Read access to what a [`MemorySink`] received.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandle {
    inner: Arc<Mutex<Recorded>>,
}

impl MemoryHandle {
    /// Every batch received, in arrival order.
    #[must_use]
    pub fn batches(&self) -> Vec<EventBatch> {
        self.inner.lock().batches.clone()
    }

    /// Every event received, flattened.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner
            .lock()
            .batches
            .iter()
            .flat_map(|b| b.iter().cloned())
            .collect()
    }

    /// Number of batches received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().batches.len()
    }

    /// Returns true if nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().batches.is_empty()
    }

    /// Forgets everything received so far.
    pub fn clear(&self) {
        self.inner.lock().batches.clear();
    }

    /// Makes every subsequent delivery fail with `reason`, or succeed again with `None`.
    pub fn reject_with(&self, reason: Option<String>) {
        self.inner.lock().reject = reason;
    }
}

/// Records every batch it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    handle: MemoryHandle,
}

impl MemorySink {
    /// Creates a new in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink recording into an existing handle.
    #[must_use]
    pub const fn with_handle(handle: MemoryHandle) -> Self {
        Self { handle }
    }

    /// A handle onto the recorded batches.
    #[must_use]
    pub fn handle(&self) -> MemoryHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn setup(&mut self, span: Span, _config: &AdapterConfig) -> Result<ProcessFn, AdapterError> {
        let handle = self.handle.clone();
        Ok(ProcessFn::new(move |_, batch: EventBatch| {
            let handle = handle.clone();
            let span = span.clone();
            async move {
                let mut recorded = handle.inner.lock();
                if let Some(reason) = &recorded.reject {
                    return Err(ProcessError::sink(NAME, reason));
                }
                debug!(parent: &span, events = batch.len(), "recorded batch");
                recorded.batches.push(batch);
                Ok(())
            }
        }))
    }

    async fn start(&mut self, _ctx: &Context) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn stop(&mut self, _ctx: &Context) -> Result<(), AdapterError> {
        Ok(())
    }
}
