//! A client for a document database's change-subscription protocol: negotiates a TCP (optionally
//! TLS) connection to a cluster node, reads batches of documents as they're produced, and dispatches
//! them to application code, reconnecting (and following server-directed redirects) as needed.
//!
//! The entry point is [`worker::SubscriptionWorker`]; construct one with [`options::SubscriptionOptions`]
//! and a [`topology::TopologyClient`] implementation, then register a `batch` listener to start it.

pub mod batch;
mod defaults;
mod dispatch;
pub mod error;
mod events;
pub mod messages;
pub mod options;
mod pump;
mod reconnect;
pub mod topology;
pub mod transport;
mod wire_duration;
pub mod worker;

pub use batch::Batch;
pub use error::{SubscriberError, SubscriptionWorkerError};
pub use options::{DocumentTypeDescriptor, SubscriptionOpeningStrategy, SubscriptionOptions};
pub use topology::{TcpConnectionInfo, TopologyClient, TopologyNode};
pub use worker::SubscriptionWorker;
