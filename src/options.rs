//! [`SubscriptionOptions`]: the immutable configuration a worker is started with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// How the worker should behave when the subscription it names is already open elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SubscriptionOpeningStrategy {
    /// Connect only if no other worker currently holds the subscription.
    OpenIfFree,
    /// Forcibly disconnect any existing worker and take over the subscription.
    TakeOver,
    /// Queue behind the current holder and connect once it disconnects.
    WaitForFree,
    /// Allow multiple workers to consume the same subscription concurrently.
    Concurrent,
}

impl Default for SubscriptionOpeningStrategy {
    fn default() -> Self {
        SubscriptionOpeningStrategy::OpenIfFree
    }
}

/// A descriptor for the document type a batch's payloads should be materialized as; the worker
/// itself never inspects this beyond passing it through to the session factory the caller
/// supplies. A bare type name is enough to thread through logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTypeDescriptor(pub String);

impl DocumentTypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        DocumentTypeDescriptor(name.into())
    }
}

/// Immutable configuration for a [`crate::worker::SubscriptionWorker`], validated once at
/// construction and never mutated for the lifetime of the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionOptions {
    pub subscription_name: String,
    #[serde(default)]
    pub strategy: SubscriptionOpeningStrategy,
    #[serde(default = "defaults::max_docs_per_batch")]
    pub max_docs_per_batch: u32,
    #[serde(default = "defaults::time_to_wait_before_connection_retry", with = "humantime_serde")]
    pub time_to_wait_before_connection_retry: Duration,
    #[serde(default = "defaults::max_erroneous_period", with = "humantime_serde")]
    pub max_erroneous_period: Duration,
    #[serde(default = "defaults::ignore_subscriber_errors")]
    pub ignore_subscriber_errors: bool,
    #[serde(default = "defaults::close_when_no_docs_left")]
    pub close_when_no_docs_left: bool,
    pub document_type: DocumentTypeDescriptor,
    #[serde(default = "defaults::with_revisions")]
    pub with_revisions: bool,
}

/// The subscription name given to [`SubscriptionOptions::new`] was empty.
#[derive(Debug, thiserror::Error)]
#[error("subscription name must not be empty")]
pub struct EmptySubscriptionName;

impl SubscriptionOptions {
    /// Construct options for the named subscription, with every other field at its default.
    ///
    /// Rejects an empty `subscription_name`, per the data model's invariant.
    pub fn new(
        subscription_name: impl Into<String>,
        document_type: DocumentTypeDescriptor,
    ) -> Result<Self, EmptySubscriptionName> {
        let subscription_name = subscription_name.into();
        if subscription_name.is_empty() {
            return Err(EmptySubscriptionName);
        }
        Ok(SubscriptionOptions {
            subscription_name,
            strategy: SubscriptionOpeningStrategy::default(),
            max_docs_per_batch: defaults::max_docs_per_batch(),
            time_to_wait_before_connection_retry: defaults::time_to_wait_before_connection_retry(),
            max_erroneous_period: defaults::max_erroneous_period(),
            ignore_subscriber_errors: defaults::ignore_subscriber_errors(),
            close_when_no_docs_left: defaults::close_when_no_docs_left(),
            document_type,
            with_revisions: defaults::with_revisions(),
        })
    }

    /// Set the strategy used when opening a subscription that may already be held elsewhere.
    pub fn strategy(&mut self, strategy: SubscriptionOpeningStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Set the maximum number of documents the server will include in a single batch.
    pub fn max_docs_per_batch(&mut self, max_docs_per_batch: u32) -> &mut Self {
        self.max_docs_per_batch = max_docs_per_batch;
        self
    }

    /// Set how long to wait before retrying a dropped connection.
    pub fn time_to_wait_before_connection_retry(&mut self, delay: Duration) -> &mut Self {
        self.time_to_wait_before_connection_retry = delay;
        self
    }

    /// Set the maximum span of consecutive connection failures tolerated before the worker gives
    /// up with a fatal `SubscriptionInvalidState` error.
    pub fn max_erroneous_period(&mut self, period: Duration) -> &mut Self {
        self.max_erroneous_period = period;
        self
    }

    /// If true, errors raised by `batch` listeners are logged and swallowed rather than
    /// terminating the worker.
    pub fn ignore_subscriber_errors(&mut self, ignore: bool) -> &mut Self {
        self.ignore_subscriber_errors = ignore;
        self
    }

    /// If true, the server closes the subscription once it has no further documents to deliver.
    pub fn close_when_no_docs_left(&mut self, close: bool) -> &mut Self {
        self.close_when_no_docs_left = close;
        self
    }

    /// Fix the payload schema variant to include revision pairs rather than bare documents.
    pub fn with_revisions(&mut self, with_revisions: bool) -> &mut Self {
        self.with_revisions = with_revisions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_subscription_name() {
        let doc_type = DocumentTypeDescriptor::new("Order");
        assert!(SubscriptionOptions::new("", doc_type).is_err());
    }

    #[test]
    fn round_trips_through_serde() {
        let mut options =
            SubscriptionOptions::new("orders", DocumentTypeDescriptor::new("Order")).unwrap();
        options
            .strategy(SubscriptionOpeningStrategy::TakeOver)
            .max_docs_per_batch(128)
            .time_to_wait_before_connection_retry(Duration::from_secs(2));

        let json = serde_json::to_string(&options).unwrap();
        let round_tripped: SubscriptionOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped.subscription_name, options.subscription_name);
        assert_eq!(round_tripped.max_docs_per_batch, 128);
        assert_eq!(
            round_tripped.time_to_wait_before_connection_retry,
            Duration::from_secs(2)
        );
    }
}
