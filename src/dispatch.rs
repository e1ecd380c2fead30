//! C5 — dispatch: deliver a finished batch to every `batch` listener and decide whether it
//! should be acknowledged.

use std::sync::Arc;

use tracing::warn;

use crate::batch::Batch;
use crate::error::SubscriptionWorkerError;
use crate::events::EventEmitter;

/// Run `batch` through every registered listener, waiting for each to signal completion.
///
/// Returns `Ok(())` when the batch should be acknowledged: either every listener succeeded, or
/// `ignore_subscriber_errors` is set and a failure was logged instead of propagated. Otherwise
/// returns the listener's error, which ends the current connection (section 5).
pub(crate) async fn dispatch(
    emitter: &EventEmitter,
    batch: Arc<Batch>,
    ignore_subscriber_errors: bool,
) -> Result<(), SubscriptionWorkerError> {
    match emitter.dispatch_batch(batch).await {
        Ok(()) => Ok(()),
        Err(err) if ignore_subscriber_errors => {
            warn!(error = %err, "batch listener failed; ignoring per configuration");
            Ok(())
        }
        Err(err) => Err(SubscriptionWorkerError::Subscriber(err)),
    }
}
