//! [`Batch`]: the ordered group of documents delivered to subscriber listeners between two
//! `EndOfBatch` frames.

use serde_json::{Map, Value};

use crate::error::SubscriptionWorkerError;

/// A batch of documents bounded by the most recent `EndOfBatch`.
///
/// Created once when the worker first connects and reused across iterations: each new batch
/// overwrites the previous contents via [`Batch::initialize`] rather than allocating a fresh
/// instance, mirroring the upstream implementation's reuse of a single mutable buffer.
#[derive(Debug, Default)]
pub struct Batch {
    items: Vec<Map<String, Value>>,
    last_received_change_vector: Option<String>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Batch::default()
    }

    /// Replace this batch's contents with a freshly read set of documents, and extract the
    /// change vector that should be acknowledged once dispatch completes.
    ///
    /// The change vector is taken from the last item's `change_vector` field, per the data
    /// model: it is *not* recomputed from whatever remains in the buffer after a `Confirm`
    /// truncation, because that truncation operates on the pump's in-flight read buffer, not on
    /// this already-finalized batch.
    pub(crate) fn initialize(
        &mut self,
        incoming: Vec<Map<String, Value>>,
    ) -> Result<String, SubscriptionWorkerError> {
        let change_vector = incoming
            .last()
            .and_then(|doc| doc.get("change_vector"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                SubscriptionWorkerError::protocol_violation(
                    "batch's final document carried no change vector",
                )
            })?;
        self.items = incoming;
        self.last_received_change_vector = Some(change_vector.clone());
        Ok(change_vector)
    }

    /// The documents in this batch, in server order.
    pub fn items(&self) -> &[Map<String, Value>] {
        &self.items
    }

    /// The change vector of the last document in this batch, once initialized.
    pub fn last_received_change_vector(&self) -> Option<&str> {
        self.last_received_change_vector.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(change_vector: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("change_vector".into(), Value::String(change_vector.into()));
        map
    }

    #[test]
    fn initialize_extracts_final_change_vector() {
        let mut batch = Batch::new();
        let cv = batch
            .initialize(vec![doc("A:1-aaa"), doc("A:2-bbb")])
            .unwrap();
        assert_eq!(cv, "A:2-bbb");
        assert_eq!(batch.items().len(), 2);
        assert_eq!(batch.last_received_change_vector(), Some("A:2-bbb"));
    }

    #[test]
    fn initialize_rejects_missing_change_vector() {
        let mut batch = Batch::new();
        assert!(batch.initialize(vec![Map::new()]).is_err());
    }
}
