//! Processing functions and the concurrent fan-out dispatcher.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::debug;

use crate::context::Context;
use crate::error::ProcessError;
use crate::event::EventBatch;

/// Future returned by a [`ProcessFn`].
pub type ProcessFuture = BoxFuture<'static, Result<(), ProcessError>>;

type ProcessFnInner = dyn Fn(Context, EventBatch) -> ProcessFuture + Send + Sync;

/// Callable that delivers an event batch onward.
///
/// Sinks produce one from Setup; inputs are bound to exactly one for their
/// whole lifetime. Cloning is cheap and shares the same function.
#[derive(Clone)]
pub struct ProcessFn(Arc<ProcessFnInner>);

impl fmt::Debug for ProcessFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessFn").finish_non_exhaustive()
    }
}

impl ProcessFn {
    /// Wraps an async closure as a processing function.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, EventBatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
    {
        Self(Arc::new(move |ctx, batch| Box::pin(f(ctx, batch))))
    }

    /// A processing function that accepts every batch and does nothing.
    #[must_use]
    pub fn discard() -> Self {
        Self::new(|_, _| async { Ok(()) })
    }

    /// Builds the processing function bound to inputs: a fan-out over `sinks`.
    #[must_use]
    pub fn fan_out(sinks: Vec<Self>) -> Self {
        let sinks: Arc<[Self]> = sinks.into();
        Self::new(move |ctx, batch| {
            let sinks = Arc::clone(&sinks);
            async move { fan_out(&ctx, &sinks, batch).await }
        })
    }

    /// Invokes the function.
    pub fn call(&self, ctx: Context, batch: EventBatch) -> ProcessFuture {
        (self.0)(ctx, batch)
    }
}

/// Delivers `batch` to every sink concurrently.
///
/// Every invocation is started before any result is inspected. The context
/// shared by the invocations is cancelled as soon as the first one fails; the
/// dispatcher still waits for all of them and returns the first error observed.
/// Delivery is not transactional: sinks that succeeded keep the batch.
///
/// Dropping the returned future cancels the shared context but does not abort
/// the invocations; sinks that ignore cancellation run to completion.
pub async fn fan_out(
    ctx: &Context,
    sinks: &[ProcessFn],
    batch: EventBatch,
) -> Result<(), ProcessError> {
    let shared = ctx.with_cancel();
    let _cancel_on_drop = shared.drop_guard();
    let mut tasks = Detached(JoinSet::new());
    for sink in sinks {
        tasks.0.spawn(sink.call(shared.clone(), Arc::clone(&batch)));
    }

    let mut first_error = None;
    while let Some(joined) = tasks.0.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(ProcessError::from(e)));
        if let Err(err) = outcome {
            if first_error.is_none() {
                debug!(error = %err, "sink failed, cancelling remaining deliveries");
                shared.cancel();
                first_error = Some(err);
            }
        }
    }
    shared.cancel();

    first_error.map_or(Ok(()), Err)
}

/// Detaches instead of aborting whatever is still running when dropped.
struct Detached<T: 'static>(JoinSet<T>);

impl<T: 'static> Drop for Detached<T> {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn batch(n: usize) -> EventBatch {
        vec![AuditEvent::default(); n].into()
    }

    fn counting(counter: &Arc<AtomicUsize>) -> ProcessFn {
        let counter = Arc::clone(counter);
        ProcessFn::new(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_fan_out_no_sinks() {
        assert!(fan_out(&Context::background(), &[], batch(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_fan_out_all_succeed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let sinks: Vec<_> = (0..5).map(|_| counting(&counter)).collect();

        fan_out(&Context::background(), &sinks, batch(3))
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fan_out_passes_same_batch() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sinks: Vec<_> = (0..3)
            .map(|_| {
                let seen = Arc::clone(&seen);
                ProcessFn::new(move |_, batch: EventBatch| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().push(batch);
                        Ok(())
                    }
                })
            })
            .collect();

        let original = batch(2);
        fan_out(&Context::background(), &sinks, Arc::clone(&original))
            .await
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|b| Arc::ptr_eq(b, &original)));
    }

    #[tokio::test]
    async fn test_fan_out_failure_cancels_others() {
        let failing = ProcessFn::new(|_, _| async { Err(ProcessError::sink("broken", "boom")) });
        let observed_cancel = Arc::new(AtomicUsize::new(0));
        let waiting = {
            let observed_cancel = Arc::clone(&observed_cancel);
            ProcessFn::new(move |ctx: Context, _| {
                let observed_cancel = Arc::clone(&observed_cancel);
                async move {
                    ctx.done().await;
                    observed_cancel.fetch_add(1, Ordering::SeqCst);
                    Err(ProcessError::Cancelled)
                }
            })
        };

        let err = fan_out(&Context::background(), &[waiting, failing], batch(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Sink { .. }));
        assert_eq!(observed_cancel.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fan_out_waits_for_sinks_ignoring_cancellation() {
        let finished = Arc::new(AtomicUsize::new(0));
        let slow = {
            let finished = Arc::clone(&finished);
            ProcessFn::new(move |_, _| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        let failing = ProcessFn::new(|_, _| async { Err(ProcessError::sink("broken", "boom")) });

        assert!(fan_out(&Context::background(), &[slow, failing], batch(1))
            .await
            .is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fan_out_dropped_caller_leaves_sinks_running() {
        let finished = Arc::new(AtomicUsize::new(0));
        let observed_ctx = Arc::new(parking_lot::Mutex::new(None));
        let slow = {
            let finished = Arc::clone(&finished);
            let observed_ctx = Arc::clone(&observed_ctx);
            ProcessFn::new(move |ctx: Context, _| {
                let finished = Arc::clone(&finished);
                *observed_ctx.lock() = Some(ctx);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };

        let sinks = [slow];
        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            fan_out(&Context::background(), &sinks, batch(1)),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(observed_ctx.lock().as_ref().unwrap().is_cancelled());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fan_out_parent_not_cancelled_by_failure() {
        let parent = Context::background();
        let failing = ProcessFn::new(|_, _| async { Err(ProcessError::sink("broken", "boom")) });
        let _ = fan_out(&parent, &[failing], batch(1)).await;
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_fan_out_reports_panicking_sink() {
        let panicking = ProcessFn::new(|_, _| async {
            let exploded = true;
            assert!(!exploded, "sink exploded");
            Ok(())
        });
        let err = fan_out(&Context::background(), &[panicking], batch(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Panicked(_)));
    }

    #[tokio::test]
    async fn test_fan_out_process_fn() {
        let counter = Arc::new(AtomicUsize::new(0));
        let process = ProcessFn::fan_out(vec![counting(&counter), counting(&counter)]);

        process.call(Context::background(), batch(1)).await.unwrap();
        process.call(Context::background(), batch(1)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
