//! C6 — failure classification and the erroneous-window guard.
//!
//! Grounded on the MongoDB driver's `ChangeStream::is_error_recoverable`: most transport and
//! protocol failures are worth retrying, but a handful of server-reported states (the
//! subscription doesn't exist, is in use under a strategy that forbids takeover, or the database
//! itself is gone) can never be fixed by reconnecting and should propagate immediately.

use std::time::{Duration, Instant};

use crate::error::SubscriptionWorkerError;

/// What the worker should do after a connection attempt has failed.
pub(crate) enum ReconnectAction {
    /// Sleep, then open a new connection against the same node.
    Retry,
    /// Sleep, then open a new connection against the named node.
    RedirectTo(String),
    /// Give up; this error should be surfaced to `error` listeners and end the worker.
    Fatal,
}

/// Decide what a failed connection attempt means for the worker's retry loop. Borrows the error
/// so the caller can still use it (to emit `error`/`connectionRetry`/`end` events) regardless of
/// which action comes back.
pub(crate) fn classify(err: &SubscriptionWorkerError) -> ReconnectAction {
    match err {
        SubscriptionWorkerError::SubscriptionDoesNotBelongToNode {
            appropriate_node: Some(node),
        } => ReconnectAction::RedirectTo(node.clone()),
        SubscriptionWorkerError::SubscriptionDoesNotBelongToNode {
            appropriate_node: None,
        } => ReconnectAction::Retry,
        SubscriptionWorkerError::ChangeVectorUpdateConcurrency => ReconnectAction::Retry,
        SubscriptionWorkerError::Connection(_)
        | SubscriptionWorkerError::Tls(_)
        | SubscriptionWorkerError::StreamEnded
        | SubscriptionWorkerError::ProtocolViolation(_)
        | SubscriptionWorkerError::Malformed(_) => ReconnectAction::Retry,
        SubscriptionWorkerError::Authorization(_)
        | SubscriptionWorkerError::InvalidOperation(_)
        | SubscriptionWorkerError::SubscriptionInUse { .. }
        | SubscriptionWorkerError::SubscriptionDoesNotExist { .. }
        | SubscriptionWorkerError::SubscriptionClosed { .. }
        | SubscriptionWorkerError::SubscriptionInvalidState { .. }
        | SubscriptionWorkerError::DatabaseDoesNotExist(_)
        | SubscriptionWorkerError::AllTopologyNodesDown
        | SubscriptionWorkerError::Subscriber(_) => ReconnectAction::Fatal,
    }
}

/// Tracks how long the worker has been failing to connect, consecutively. A single success
/// resets it; a span of retryable failures longer than `max_erroneous_period` escalates to a
/// fatal `SubscriptionInvalidState`, per section 4.5.
pub(crate) struct ErroneousWindow {
    started: Option<Instant>,
    limit: Duration,
}

impl ErroneousWindow {
    pub(crate) fn new(limit: Duration) -> Self {
        ErroneousWindow {
            started: None,
            limit,
        }
    }

    pub(crate) fn note_success(&mut self) {
        self.started = None;
    }

    /// Record a retryable failure. Returns `Some(elapsed)` once the window has run past its
    /// limit, at which point the caller should escalate rather than retry again.
    pub(crate) fn note_failure(&mut self, now: Instant) -> Option<Duration> {
        let started = *self.started.get_or_insert(now);
        let elapsed = now.duration_since(started);
        if elapsed >= self.limit {
            Some(elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = SubscriptionWorkerError::StreamEnded;
        assert!(matches!(classify(&err), ReconnectAction::Retry));
    }

    #[test]
    fn redirect_carries_the_node_tag() {
        let err = SubscriptionWorkerError::SubscriptionDoesNotBelongToNode {
            appropriate_node: Some("B".to_string()),
        };
        match classify(&err) {
            ReconnectAction::RedirectTo(node) => assert_eq!(node, "B"),
            _ => panic!("expected redirect"),
        }
    }

    #[test]
    fn subscription_in_use_is_fatal() {
        let err = SubscriptionWorkerError::SubscriptionInUse {
            name: "orders".to_string(),
        };
        assert!(matches!(classify(&err), ReconnectAction::Fatal));
    }

    #[test]
    fn window_escalates_once_limit_elapses() {
        let mut window = ErroneousWindow::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(window.note_failure(start).is_none());
        assert!(window.note_failure(start + Duration::from_secs(5)).is_none());
        assert!(window.note_failure(start + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn success_resets_the_window() {
        let mut window = ErroneousWindow::new(Duration::from_secs(10));
        let start = Instant::now();
        window.note_failure(start);
        window.note_success();
        assert!(window.note_failure(start + Duration::from_secs(20)).is_none());
    }
}
