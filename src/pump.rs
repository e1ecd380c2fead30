//! C4 — the batch pump: reads frames off an already-negotiated connection and assembles them
//! into a [`Batch`], per the state machine in section 4.4.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::batch::Batch;
use crate::error::SubscriptionWorkerError;
use crate::messages::{
    status_as_error, ClientMessage, ConnectionStatusKind, KeyProfile, WireServerMessage,
};
use crate::transport::FramedMessageStream;

/// Reads [`WireServerMessage`] frames from an open connection and folds `Data` frames into a
/// [`Batch`], stopping at the frame that ends or interrupts the current batch.
pub struct Pump<S> {
    stream: FramedMessageStream<S>,
    profile: KeyProfile,
    subscription_name: String,
}

/// What ended a call to [`Pump::read_single_batch`].
pub enum PumpOutcome {
    /// `EndOfBatch` arrived; the batch is ready to dispatch. Carries the change vector that
    /// should eventually be acknowledged.
    BatchReady { change_vector: String },
    /// The peer closed the connection cleanly with no batch in progress — the terminal,
    /// non-error end of stream (section 4.2's "disposal resolves to null").
    StreamClosed,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Pump<S> {
    pub fn new(stream: FramedMessageStream<S>, profile: KeyProfile, subscription_name: String) -> Self {
        Pump {
            stream,
            profile,
            subscription_name,
        }
    }

    pub fn into_inner(self) -> FramedMessageStream<S> {
        self.stream
    }

    /// Send an `Acknowledge` for the batch just dispatched.
    pub async fn acknowledge(&mut self, change_vector: String) -> Result<(), SubscriptionWorkerError> {
        self.stream
            .send(&ClientMessage::Acknowledge { change_vector })
            .await
    }

    /// Read frames until a batch is complete, folding `Data` frames into `batch` in order.
    ///
    /// A `Confirm` arriving here is the acknowledgment of a *previous* batch's `Acknowledge`,
    /// overlapping with the read of the next one (section 5's overlapping pipeline); it carries
    /// no data and is consumed without disturbing whatever is currently being accumulated.
    pub async fn read_single_batch(
        &mut self,
        batch: &mut Batch,
    ) -> Result<PumpOutcome, SubscriptionWorkerError> {
        let mut pending = Vec::new();

        loop {
            match self.stream.next_message().await? {
                None if pending.is_empty() => return Ok(PumpOutcome::StreamClosed),
                None => return Err(SubscriptionWorkerError::StreamEnded),
                Some(WireServerMessage::Data(data)) => {
                    pending.push(self.profile.normalize(data.raw));
                }
                Some(WireServerMessage::EndOfBatch) => {
                    let change_vector = batch.initialize(std::mem::take(&mut pending))?;
                    return Ok(PumpOutcome::BatchReady { change_vector });
                }
                Some(WireServerMessage::Confirm) => {
                    trace!("received Confirm for a prior acknowledge while reading ahead");
                }
                Some(WireServerMessage::ConnectionStatus(status)) => {
                    if status.status == ConnectionStatusKind::Accepted {
                        continue;
                    }
                    let redirected_tag = status.data.and_then(|data| data.redirected_tag);
                    return Err(status_as_error(
                        &self.subscription_name,
                        status.status,
                        status.message,
                        redirected_tag,
                    ));
                }
                Some(WireServerMessage::Error(err)) => {
                    return Err(SubscriptionWorkerError::protocol_violation(
                        err.message
                            .or(err.exception)
                            .unwrap_or_else(|| "server reported an error".to_string()),
                    ));
                }
            }
        }
    }
}
