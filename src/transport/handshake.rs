//! C3 — protocol negotiation: the `TcpConnectionHeader`/`TcpConnectionHeaderResponse` exchange
//! followed by the subscription connection options payload.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::defaults::{OUT_OF_RANGE_STATUS, SUBSCRIPTION_TCP_VERSION};
use crate::error::SubscriptionWorkerError;
use crate::messages::ClientMessage;
use crate::options::SubscriptionOptions;
use crate::transport::io_stream::IoStream;
use crate::wire_duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TcpConnectionHeader<'a> {
    operation: &'static str,
    database_name: &'a str,
    operation_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_node_tag: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_url: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum TcpConnectionStatus {
    Ok,
    AuthorizationFailed,
    TcpVersionMismatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TcpConnectionHeaderResponse {
    status: TcpConnectionStatus,
    version: i32,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireSubscriptionConnectionOptions<'a> {
    subscription_name: &'a str,
    #[serde(with = "wire_duration")]
    time_to_wait_before_connection_retry: Duration,
    ignore_subscriber_errors: bool,
    strategy: crate::options::SubscriptionOpeningStrategy,
    max_docs_per_batch: u32,
    #[serde(with = "wire_duration")]
    max_erroneous_period: Duration,
    close_when_no_docs_left: bool,
}

/// The outcome of a successful negotiation: the agreed protocol version, kept around for
/// diagnostics (section 4.3: "supported_features").
#[derive(Debug, Clone, Copy)]
pub struct NegotiatedProtocol {
    pub version: i32,
}

/// Run the handshake and subscription-options exchange against a freshly connected `stream`.
///
/// `destination_node_tag` is set when this connection is being retried against a node named by a
/// prior `Redirect`.
pub async fn negotiate(
    stream: &mut IoStream,
    database: &str,
    options: &SubscriptionOptions,
    destination_node_tag: Option<&str>,
) -> Result<NegotiatedProtocol, SubscriptionWorkerError> {
    let header = TcpConnectionHeader {
        operation: "Subscription",
        database_name: database,
        operation_version: SUBSCRIPTION_TCP_VERSION,
        destination_node_tag,
        destination_url: None,
    };
    write_json(stream, &header).await?;

    let response: TcpConnectionHeaderResponse = read_json(stream).await?;
    let version = match response.status {
        TcpConnectionStatus::Ok => response.version,
        TcpConnectionStatus::AuthorizationFailed => {
            return Err(SubscriptionWorkerError::Authorization(
                response
                    .message
                    .unwrap_or_else(|| "authorization failed".to_string()),
            ));
        }
        TcpConnectionStatus::TcpVersionMismatch if response.version == OUT_OF_RANGE_STATUS => {
            write_json(
                stream,
                &ClientMessage::Drop {
                    database: database.to_string(),
                    operation_version: SUBSCRIPTION_TCP_VERSION,
                    info: "client protocol version not supported by server".to_string(),
                },
            )
            .await
            .ok();
            return Err(SubscriptionWorkerError::InvalidOperation(
                "server does not support any protocol version known to this client".to_string(),
            ));
        }
        TcpConnectionStatus::TcpVersionMismatch => response.version,
    };

    if version <= 0 {
        return Err(SubscriptionWorkerError::InvalidOperation(format!(
            "negotiated protocol version {version} is not usable"
        )));
    }
    debug!(negotiated_version = version, "subscription handshake complete");

    let wire_options = WireSubscriptionConnectionOptions {
        subscription_name: &options.subscription_name,
        time_to_wait_before_connection_retry: options.time_to_wait_before_connection_retry,
        ignore_subscriber_errors: options.ignore_subscriber_errors,
        strategy: options.strategy,
        max_docs_per_batch: options.max_docs_per_batch,
        max_erroneous_period: options.max_erroneous_period,
        close_when_no_docs_left: options.close_when_no_docs_left,
    };
    write_json(stream, &wire_options).await?;

    Ok(NegotiatedProtocol { version })
}

async fn write_json(
    stream: &mut IoStream,
    value: &impl Serialize,
) -> Result<(), SubscriptionWorkerError> {
    let bytes = serde_json::to_vec(value)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Read a single, complete JSON object from `stream`, byte by byte, tracking brace nesting — used
/// only for the two handshake responses, which precede the steady-state framed stream in
/// [`crate::framed`].
async fn read_json<T: for<'de> Deserialize<'de>>(
    stream: &mut IoStream,
) -> Result<T, SubscriptionWorkerError> {
    let mut buffer = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut started = false;

    loop {
        let mut byte = [0u8; 1];
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(SubscriptionWorkerError::StreamEnded);
        }
        let byte = byte[0];
        buffer.push(byte);

        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => {
                depth += 1;
                started = true;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if started && depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }

    serde_json::from_slice(&buffer).map_err(SubscriptionWorkerError::from)
}
