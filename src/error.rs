//! The error taxonomy that drives the subscription worker's reconnect policy.
//!
//! Every fallible operation in this crate returns [`SubscriptionWorkerError`]; the
//! [`crate::reconnect`] module is the only place that inspects variants to decide whether to
//! retry, redirect, or give up.

use std::fmt;

use thiserror::Error;

/// A boxed subscriber-provided error, kept type-erased since the subscriber callback is generic
/// over whatever error type the caller's document-materialization code produces.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubscriptionWorkerError {
    /// A transport-level failure: connecting, reading, or writing the socket.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A TLS handshake or certificate-loading failure.
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::TLSError),

    /// The stream produced a frame that doesn't fit the protocol's state machine: an
    /// unrecognized discriminator, or a `ConnectionStatus` where data was expected.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A frame could not be parsed as JSON, or the handshake payload was malformed.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The stream ended before an `EndOfBatch` or before disposal was requested.
    #[error("stream ended unexpectedly")]
    StreamEnded,

    /// `TcpConnectionHeaderResponse.Status == AuthorizationFailed`, or a `ConnectionStatus` of
    /// kind `Invalid` coming back as an authorization rejection.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The negotiated protocol version was out of range, non-positive, or otherwise left the
    /// connection unusable; also covers a `TcpVersionMismatch` with no fallback version.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// `ConnectionStatus.status == Redirect`, carrying the server's preferred node when known.
    #[error("subscription does not belong to this node{}", appropriate_node.as_deref().map(|n| format!("; appropriate node is {n}")).unwrap_or_default())]
    SubscriptionDoesNotBelongToNode { appropriate_node: Option<String> },

    /// The server rejected an `Acknowledge` because its change vector was concurrently updated.
    #[error("the subscription's change vector was updated concurrently")]
    ChangeVectorUpdateConcurrency,

    /// `ConnectionStatus.status == InUse`, and the open strategy forbade taking over.
    #[error("subscription {name:?} is already in use")]
    SubscriptionInUse { name: String },

    /// `ConnectionStatus.status == NotFound`.
    #[error("subscription {name:?} does not exist")]
    SubscriptionDoesNotExist { name: String },

    /// `ConnectionStatus.status == Closed`.
    #[error("subscription {name:?} was closed by the server")]
    SubscriptionClosed { name: String },

    /// `ConnectionStatus.status == Invalid`, or the erroneous-window guard escalated.
    #[error("subscription {name:?} is in an invalid state: {reason}")]
    SubscriptionInvalidState { name: String, reason: String },

    /// The database named in the handshake does not exist on the node.
    #[error("database {0:?} does not exist")]
    DatabaseDoesNotExist(String),

    /// The topology client reports no reachable nodes remain.
    #[error("all topology nodes are down")]
    AllTopologyNodesDown,

    /// A registered `batch` listener's completion callback was invoked with an error, and
    /// `ignore_subscriber_errors` was false.
    #[error("subscriber callback failed: {0}")]
    Subscriber(#[source] SubscriberError),
}

impl SubscriptionWorkerError {
    pub(crate) fn protocol_violation(message: impl fmt::Display) -> Self {
        SubscriptionWorkerError::ProtocolViolation(message.to_string())
    }
}
