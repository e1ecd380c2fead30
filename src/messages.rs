//! Wire representations of server- and client-sent subscription frames, and the key-normalization
//! profile that translates the server's PascalCase field names into the client's canonical form.
//!
//! See design note "Stream-based JSON parsing with key renaming": the profile is a static mapping
//! from the schema kind (plain documents vs. revision pairs) to a renamer, computed once per
//! worker rather than re-derived per frame.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SubscriptionWorkerError;

/// The status carried by a `ConnectionStatus` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ConnectionStatusKind {
    Accepted,
    InUse,
    Closed,
    Invalid,
    NotFound,
    Redirect,
    ConcurrencyReconnect,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionStatusData {
    pub redirected_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireConnectionStatus {
    pub status: ConnectionStatusKind,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub data: Option<ConnectionStatusData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireError {
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireData {
    /// The remaining top-level keys on a `Data` frame, prior to key normalization. For a plain
    /// document this is the document's own fields plus `@metadata`; for a revisions batch it
    /// holds `Current`/`Previous` sub-objects.
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

/// A single frame received from the server, as it appears on the wire, keyed by its `Type`
/// discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Type")]
pub enum WireServerMessage {
    ConnectionStatus(WireConnectionStatus),
    Data(WireData),
    EndOfBatch,
    Confirm,
    Error(WireError),
}

impl WireServerMessage {
    /// Apply the worker's [`KeyProfile`] to a `Data` frame's payload; all other variants pass
    /// through unchanged.
    pub fn normalize(self, profile: &KeyProfile) -> ServerMessage {
        match self {
            WireServerMessage::ConnectionStatus(status) => ServerMessage::ConnectionStatus {
                status: status.status,
                message: status.message,
                exception: status.exception,
                redirected_tag: status.data.and_then(|data| data.redirected_tag),
            },
            WireServerMessage::Data(data) => ServerMessage::Data {
                payload: profile.normalize(data.raw),
            },
            WireServerMessage::EndOfBatch => ServerMessage::EndOfBatch,
            WireServerMessage::Confirm => ServerMessage::Confirm,
            WireServerMessage::Error(error) => ServerMessage::Error {
                exception: error.exception,
                message: error.message,
            },
        }
    }
}

/// A [`WireServerMessage`] after key normalization has been applied to any `Data` payload; this
/// is what the rest of the worker operates on.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    ConnectionStatus {
        status: ConnectionStatusKind,
        message: Option<String>,
        exception: Option<String>,
        redirected_tag: Option<String>,
    },
    Data {
        payload: Map<String, Value>,
    },
    EndOfBatch,
    Confirm,
    Error {
        exception: Option<String>,
        message: Option<String>,
    },
}

/// Translate a non-`Accepted` `ConnectionStatus` into the error that should end the current
/// connection attempt; shared by the worker's initial open and by the pump, since a `Redirect`
/// or `InUse` can arrive either as the very first frame or, after a topology change, mid-stream.
pub(crate) fn status_as_error(
    subscription_name: &str,
    status: ConnectionStatusKind,
    message: Option<String>,
    redirected_tag: Option<String>,
) -> SubscriptionWorkerError {
    match status {
        ConnectionStatusKind::Accepted => unreachable!("Accepted is not an error status"),
        ConnectionStatusKind::InUse => SubscriptionWorkerError::SubscriptionInUse {
            name: subscription_name.to_string(),
        },
        ConnectionStatusKind::Closed => SubscriptionWorkerError::SubscriptionClosed {
            name: subscription_name.to_string(),
        },
        ConnectionStatusKind::NotFound => SubscriptionWorkerError::SubscriptionDoesNotExist {
            name: subscription_name.to_string(),
        },
        ConnectionStatusKind::Invalid => SubscriptionWorkerError::SubscriptionInvalidState {
            name: subscription_name.to_string(),
            reason: message.unwrap_or_else(|| "server reported an invalid subscription state".to_string()),
        },
        ConnectionStatusKind::Redirect => SubscriptionWorkerError::SubscriptionDoesNotBelongToNode {
            appropriate_node: redirected_tag,
        },
        ConnectionStatusKind::ConcurrencyReconnect => {
            SubscriptionWorkerError::ChangeVectorUpdateConcurrency
        }
    }
}

/// A message the worker sends to the server.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Acknowledge { change_vector: String },
    Drop {
        database: String,
        operation_version: i32,
        info: String,
    },
}

impl Serialize for ClientMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ClientMessage::Acknowledge { change_vector } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("ChangeVector", change_vector)?;
                map.serialize_entry("Type", "Acknowledge")?;
                map.end()
            }
            ClientMessage::Drop {
                database,
                operation_version,
                info,
            } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("Operation", "Drop")?;
                map.serialize_entry("DatabaseName", database)?;
                map.serialize_entry("OperationVersion", operation_version)?;
                map.serialize_entry("Info", info)?;
                map.end()
            }
        }
    }
}

/// Which key-renaming table applies to a `Data` frame's payload.
///
/// Computed once per worker from `(with_revisions, conventions)`, per the design note; a real
/// `conventions` object from the surrounding client library would parameterize further renames,
/// but the revisions/plain split covers the cases this crate's protocol needs to distinguish.
#[derive(Debug, Clone)]
pub struct KeyProfile {
    table: HashMap<&'static str, &'static str>,
}

impl KeyProfile {
    /// Build the profile for a worker configured with the given `with_revisions` flag.
    pub fn compiled(with_revisions: bool) -> Self {
        let mut table = HashMap::new();
        table.insert("Id", "id");
        table.insert("ChangeVector", "change_vector");
        table.insert("Metadata", "@metadata");
        table.insert("LastModified", "last_modified");
        if with_revisions {
            table.insert("Current", "current");
            table.insert("Previous", "previous");
        }
        KeyProfile { table }
    }

    /// Rename the top-level keys of a `Data` payload from server PascalCase into their canonical
    /// client form. Nested objects (e.g. `@metadata`'s own contents) are left untouched — the
    /// profile only governs the envelope the worker itself interprets.
    pub fn normalize(&self, raw: Map<String, Value>) -> Map<String, Value> {
        raw.into_iter()
            .map(|(key, value)| {
                let renamed = self.table.get(key.as_str()).copied().map(str::to_owned);
                (renamed.unwrap_or(key), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_keys() {
        let profile = KeyProfile::compiled(false);
        let mut raw = Map::new();
        raw.insert("Id".into(), Value::String("orders/1".into()));
        raw.insert("Total".into(), Value::from(42));

        let normalized = profile.normalize(raw);
        assert!(normalized.contains_key("id"));
        assert!(normalized.contains_key("Total"));
    }

    #[test]
    fn acknowledge_serializes_in_wire_order() {
        let message = ClientMessage::Acknowledge {
            change_vector: "A:1-abc".to_string(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"ChangeVector":"A:1-abc","Type":"Acknowledge"}"#);
    }

    #[test]
    fn parses_end_of_batch_and_confirm() {
        let end: WireServerMessage = serde_json::from_str(r#"{"Type":"EndOfBatch"}"#).unwrap();
        assert!(matches!(end, WireServerMessage::EndOfBatch));

        let confirm: WireServerMessage = serde_json::from_str(r#"{"Type":"Confirm"}"#).unwrap();
        assert!(matches!(confirm, WireServerMessage::Confirm));
    }

    #[test]
    fn parses_redirect_status() {
        let status: WireServerMessage = serde_json::from_str(
            r#"{"Type":"ConnectionStatus","Status":"Redirect","Data":{"RedirectedTag":"B"}}"#,
        )
        .unwrap();
        match status {
            WireServerMessage::ConnectionStatus(status) => {
                assert_eq!(status.status, ConnectionStatusKind::Redirect);
                assert_eq!(
                    status.data.unwrap().redirected_tag.as_deref(),
                    Some("B")
                );
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
