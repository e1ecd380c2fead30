//! C2 — the steady-state message stream: a lazy, backpressure-aware parser over the same
//! brace-depth state machine the handshake uses for its one-shot reads, but retained across
//! calls so a frame split across TCP segments is reassembled without re-reading from scratch.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SubscriptionWorkerError;
use crate::messages::{ClientMessage, WireServerMessage};

/// Parses a stream of concatenated JSON objects into [`WireServerMessage`] frames.
///
/// Reads happen only when [`FramedMessageStream::next_message`] is called — nothing is buffered
/// ahead of what's been asked for, so a subscriber that is slow to drain batches leaves bytes
/// sitting in the kernel socket buffer rather than growing an unbounded in-process queue.
pub struct FramedMessageStream<S> {
    stream: S,
    buffer: Vec<u8>,
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    started: bool,
}

impl<S: AsyncRead + Unpin> FramedMessageStream<S> {
    pub fn new(stream: S) -> Self {
        FramedMessageStream {
            stream,
            buffer: Vec::new(),
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
            started: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read and parse the next frame, blocking only on socket I/O. Returns `Ok(None)` when the
    /// peer closed the connection cleanly between frames (section 4.2: disposal during a pending
    /// read resolves to `null`, not an error).
    pub async fn next_message(
        &mut self,
    ) -> Result<Option<WireServerMessage>, SubscriptionWorkerError> {
        loop {
            if let Some(object) = self.take_complete_object() {
                let message = serde_json::from_slice(&object)?;
                return Ok(Some(message));
            }

            let mut chunk = [0u8; 8192];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(SubscriptionWorkerError::StreamEnded)
                };
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Scan newly arrived bytes for a complete top-level object, draining it (and only it) out
    /// of `buffer` when found. `scanned` persists across calls so a partial frame isn't
    /// re-walked from byte zero on every `next_message`.
    fn take_complete_object(&mut self) -> Option<Vec<u8>> {
        while self.scanned < self.buffer.len() {
            let byte = self.buffer[self.scanned];
            self.scanned += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => {
                    self.depth += 1;
                    self.started = true;
                }
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.started && self.depth == 0 {
                        let object: Vec<u8> = self.buffer.drain(..self.scanned).collect();
                        self.scanned = 0;
                        self.started = false;
                        return Some(object);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl<S: AsyncWrite + Unpin> FramedMessageStream<S> {
    /// Send a client message (an `Acknowledge` or a `Drop`) on the same socket this stream reads
    /// from.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), SubscriptionWorkerError> {
        let bytes = serde_json::to_vec(message)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    async fn pair() -> (DuplexStream, DuplexStream) {
        tokio::io::duplex(256)
    }

    #[tokio::test]
    async fn parses_frames_split_across_reads() {
        let (mut writer, reader) = pair().await;
        let mut stream = FramedMessageStream::new(reader);

        tokio::spawn(async move {
            writer.write_all(br#"{"Type":"EndOf"#).await.unwrap();
            writer.write_all(br#"Batch"}{"Type":"Confirm"}"#).await.unwrap();
        });

        let first = stream.next_message().await.unwrap().unwrap();
        assert!(matches!(first, WireServerMessage::EndOfBatch));
        let second = stream.next_message().await.unwrap().unwrap();
        assert!(matches!(second, WireServerMessage::Confirm));
    }

    #[tokio::test]
    async fn clean_close_between_frames_yields_none() {
        let (writer, reader) = pair().await;
        let mut stream = FramedMessageStream::new(reader);
        drop(writer);
        assert!(stream.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_mid_frame_is_an_error() {
        let (mut writer, reader) = pair().await;
        let mut stream = FramedMessageStream::new(reader);
        writer.write_all(br#"{"Type":"Confirm""#).await.unwrap();
        drop(writer);
        assert!(stream.next_message().await.is_err());
    }
}
