//! Streaming responses with cooperative cancellation.
//!
//! Action invocations report progress as a sequence of [`ActionEvent`]s and
//! state storage moves large state files as [`StateChunk`]s. Both flow
//! through an [`EventSender`]/[`EventStream`] pair built on a bounded tokio
//! channel. With the default buffer of one, each emission is seen by the
//! consumer before the producer can emit the next.
//!
//! Cancellation is cooperative. The consumer calls [`EventStream::stop`] (or
//! drops the stream) and the producer's next [`EventSender::emit`] returns
//! [`Error::StopRequested`]. A producer may still deliver one terminal event
//! with [`EventSender::finish`], which a consumer that stopped receives by
//! draining the stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::diagnostic::Diagnostic;
use crate::error::Error;
use crate::tftypes::AttributePath;

/// Default size of one state chunk (8 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 << 20;

/// Options for streaming RPCs.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Channel capacity between producer and consumer.
    pub buffer: usize,
    /// Maximum number of bytes in one state chunk.
    pub chunk_size: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl StreamOptions {
    /// Set the channel capacity (at least 1).
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Set the state chunk size (at least 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// A shared flag the consumer raises to ask the producer to stop.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    /// A signal that has not been raised.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been raised.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is raised.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only fails if it was dropped.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Create a connected producer/consumer pair.
pub fn event_channel<T>(options: &StreamOptions) -> (EventSender<T>, EventStream<T>) {
    let (tx, rx) = mpsc::channel(options.buffer.max(1));
    let stop = StopSignal::new();
    (
        EventSender {
            tx,
            stop: stop.clone(),
        },
        EventStream {
            inner: ReceiverStream::new(rx),
            stop,
        },
    )
}

/// Producer half of an event stream.
#[derive(Debug)]
pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
    stop: StopSignal,
}

impl<T> EventSender<T> {
    /// Send one event, waiting for channel capacity.
    ///
    /// Returns [`Error::StopRequested`] if the consumer stopped or went away,
    /// including while waiting for capacity.
    pub async fn emit(&self, event: T) -> Result<(), Error> {
        if self.is_stopped() {
            return Err(Error::StopRequested);
        }
        tokio::select! {
            sent = self.tx.send(event) => sent.map_err(|_| Error::StopRequested),
            _ = self.stop.stopped() => Err(Error::StopRequested),
        }
    }

    /// Send the terminal event and close the stream.
    ///
    /// Delivered even after a stop request, as long as the consumer still
    /// holds the stream.
    pub async fn finish(self, event: T) -> Result<(), Error> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::StopRequested)
    }

    /// Whether the consumer asked to stop or dropped the stream.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped() || self.tx.is_closed()
    }

    /// The shared stop signal.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}

/// Consumer half of an event stream.
#[derive(Debug)]
pub struct EventStream<T> {
    inner: ReceiverStream<T>,
    stop: StopSignal,
}

impl<T> EventStream<T> {
    /// Ask the producer to stop. Events already sent can still be read.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// The next event, or `None` once the producer is done.
    pub async fn next_event(&mut self) -> Option<T> {
        self.inner.next().await
    }

    /// Read every remaining event.
    pub async fn collect_events(mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// The shared stop signal.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Progress of an invoked action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvent {
    /// The action began.
    Started,
    /// A human-readable progress update.
    Progress {
        /// Progress message.
        message: String,
    },
    /// The action ran to completion, possibly with diagnostics.
    Finished {
        /// Diagnostics raised by the action.
        diagnostics: Vec<Diagnostic>,
    },
    /// The action stopped early because the consumer asked it to.
    Cancelled,
}

impl ActionEvent {
    /// A progress event.
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Cancelled)
    }
}

/// A byte range `[start, end)` within a state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// One past the last byte offset.
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One piece of a state file in transit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChunk {
    /// The chunk bytes.
    pub bytes: Vec<u8>,
    /// Size of the whole state file.
    pub total_length: u64,
    /// Where `bytes` sits in the whole file.
    pub range: ByteRange,
    /// Diagnostics raised while producing this chunk.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Split `bytes` into consecutive chunks of at most `chunk_size` bytes.
///
/// Empty input yields one empty chunk so the total length is still announced.
pub fn chunk_state_bytes(bytes: &[u8], chunk_size: usize) -> Vec<StateChunk> {
    let total_length = bytes.len() as u64;
    if bytes.is_empty() {
        return vec![StateChunk {
            bytes: Vec::new(),
            total_length,
            range: ByteRange { start: 0, end: 0 },
            diagnostics: Vec::new(),
        }];
    }

    let mut start = 0u64;
    bytes
        .chunks(chunk_size.max(1))
        .map(|piece| {
            let end = start + piece.len() as u64;
            let chunk = StateChunk {
                bytes: piece.to_vec(),
                total_length,
                range: ByteRange { start, end },
                diagnostics: Vec::new(),
            };
            start = end;
            chunk
        })
        .collect()
}

/// Stream `bytes` as chunks, stopping early if the consumer asks.
pub async fn send_state_bytes(
    sender: &EventSender<StateChunk>,
    bytes: &[u8],
    chunk_size: usize,
) -> Result<(), Error> {
    for chunk in chunk_state_bytes(bytes, chunk_size) {
        sender.emit(chunk).await?;
    }
    Ok(())
}

/// Reassembles a state file from its chunks.
#[derive(Debug, Default)]
pub struct StateChunkAssembler {
    bytes: Vec<u8>,
    total_length: Option<u64>,
    diagnostics: Vec<Diagnostic>,
}

impl StateChunkAssembler {
    /// An empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next chunk.
    ///
    /// Chunks must arrive in order, without gaps, and agree on the total length.
    pub fn push(&mut self, chunk: StateChunk) -> Result<(), Error> {
        let root = AttributePath::new();
        let received = self.bytes.len() as u64;

        match self.total_length {
            Some(total) if total != chunk.total_length => {
                return Err(Error::decode_shape(
                    &root,
                    format!(
                        "state chunk announced total length {}, earlier chunks announced {}",
                        chunk.total_length, total
                    ),
                ));
            }
            _ => self.total_length = Some(chunk.total_length),
        }
        if chunk.range.start != received {
            return Err(Error::decode_shape(
                &root,
                format!(
                    "state chunk starts at byte {}, expected {}",
                    chunk.range.start, received
                ),
            ));
        }
        if chunk.range.len() != chunk.bytes.len() as u64 {
            return Err(Error::decode_shape(
                &root,
                format!(
                    "state chunk range covers {} bytes but carries {}",
                    chunk.range.len(),
                    chunk.bytes.len()
                ),
            ));
        }
        if chunk.range.end > chunk.total_length {
            return Err(Error::decode_shape(
                &root,
                format!(
                    "state chunk ends at byte {}, past total length {}",
                    chunk.range.end, chunk.total_length
                ),
            ));
        }

        self.bytes.extend_from_slice(&chunk.bytes);
        self.diagnostics.extend(chunk.diagnostics);
        Ok(())
    }

    /// The complete state bytes and any diagnostics carried by the chunks.
    pub fn finish(self) -> Result<(Vec<u8>, Vec<Diagnostic>), Error> {
        let expected = self.total_length.unwrap_or(0);
        if self.bytes.len() as u64 != expected {
            return Err(Error::decode_shape(
                &AttributePath::new(),
                format!(
                    "state stream ended after {} of {} bytes",
                    self.bytes.len(),
                    expected
                ),
            ));
        }
        Ok((self.bytes, self.diagnostics))
    }
}
