//! The worker's event emitter: `batch`, `error`, `connectionRetry`, and `end` listeners, each
//! registered and removed independently of the background task's lifecycle (section 6).

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::batch::Batch;
use crate::error::{SubscriberError, SubscriptionWorkerError};

/// A `batch` listener reports completion by resolving the future it returns — the "completion
/// latch": the dispatch pipeline waits on this future before acknowledging, rather than treating
/// the listener as done as soon as it has been called. The batch is shared by `Arc` rather than
/// borrowed, since the listener's future must be `'static` to run on the dispatch task that
/// overlaps with reading the next batch (section 5).
pub type BatchListener =
    Box<dyn Fn(Arc<Batch>) -> BoxFuture<'static, Result<(), SubscriberError>> + Send + Sync>;

pub type ErrorListener = Box<dyn Fn(&SubscriptionWorkerError) + Send + Sync>;
pub type ConnectionRetryListener = Box<dyn Fn(&SubscriptionWorkerError) + Send + Sync>;
pub type EndListener = Box<dyn Fn(Option<&SubscriptionWorkerError>) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    batch: Vec<BatchListener>,
    error: Vec<ErrorListener>,
    connection_retry: Vec<ConnectionRetryListener>,
    end: Vec<EndListener>,
    end_fired: bool,
}

/// Cheaply cloneable handle onto the listener lists; the background task and the public
/// `SubscriptionWorker` handle both hold one.
#[derive(Clone, Default)]
pub(crate) struct EventEmitter {
    inner: Arc<Mutex<Listeners>>,
}

impl EventEmitter {
    pub(crate) fn new() -> Self {
        EventEmitter::default()
    }

    pub(crate) fn on_batch(&self, listener: BatchListener) {
        self.inner.lock().unwrap().batch.push(listener);
    }

    pub(crate) fn on_error(&self, listener: ErrorListener) {
        self.inner.lock().unwrap().error.push(listener);
    }

    pub(crate) fn on_connection_retry(&self, listener: ConnectionRetryListener) {
        self.inner.lock().unwrap().connection_retry.push(listener);
    }

    pub(crate) fn on_end(&self, listener: EndListener) {
        self.inner.lock().unwrap().end.push(listener);
    }

    pub(crate) fn remove_all_listeners(&self) {
        let mut listeners = self.inner.lock().unwrap();
        listeners.batch.clear();
        listeners.error.clear();
        listeners.connection_retry.clear();
        listeners.end.clear();
    }

    pub(crate) fn has_batch_listeners(&self) -> bool {
        !self.inner.lock().unwrap().batch.is_empty()
    }

    /// Run every `batch` listener against `batch`, waiting for each to complete in turn, and
    /// return the first error raised (if any). Listeners run sequentially, in registration
    /// order, matching the teacher's single-writer dispatch convention.
    pub(crate) async fn dispatch_batch(&self, batch: Arc<Batch>) -> Result<(), SubscriberError> {
        // The lock is re-acquired per listener, rather than held across the `.await`, since a
        // listener's future may take arbitrarily long and must not block `on`/`off` elsewhere.
        let count = self.inner.lock().unwrap().batch.len();
        for index in 0..count {
            let future = {
                let guard = self.inner.lock().unwrap();
                match guard.batch.get(index) {
                    Some(listener) => listener(batch.clone()),
                    None => continue,
                }
            };
            future.await?;
        }
        Ok(())
    }

    pub(crate) fn emit_error(&self, error: &SubscriptionWorkerError) {
        for listener in self.inner.lock().unwrap().error.iter() {
            listener(error);
        }
    }

    pub(crate) fn emit_connection_retry(&self, error: &SubscriptionWorkerError) {
        for listener in self.inner.lock().unwrap().connection_retry.iter() {
            listener(error);
        }
    }

    /// Fire `end` exactly once; later calls are no-ops, per section 6's "`end` fires exactly
    /// once" invariant.
    pub(crate) fn emit_end_once(&self, error: Option<&SubscriptionWorkerError>) {
        let mut listeners = self.inner.lock().unwrap();
        if listeners.end_fired {
            return;
        }
        listeners.end_fired = true;
        for listener in listeners.end.iter() {
            listener(error);
        }
    }
}
