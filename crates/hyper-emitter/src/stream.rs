//! # Bus Streams
//!
//! A bidirectional view of the bus. Writing a record emits it; reading yields
//! every decoded record of the change feed from the chosen cursor, including
//! the ones this stream wrote, once they went through the log.
//!
//! The halves are independent: either can be closed or dropped while the
//! other keeps working.

use crate::adapters::event_log::EventLog;
use crate::emitter::HyperEmitter;
use crate::errors::EmitterError;
use futures::{Stream, StreamExt};
use shared_types::{Cursor, DecodedEvent};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Read and write halves over the same bus.
#[derive(Debug)]
pub struct BusStream {
    pub reader: StreamReader,
    pub writer: StreamWriter,
}

impl BusStream {
    pub(crate) fn open(emitter: &HyperEmitter, log: EventLog, cursor: Cursor, buffer: usize) -> Self {
        Self {
            reader: StreamReader::open(log, cursor, buffer),
            writer: StreamWriter {
                emitter: emitter.clone(),
                closed: false,
            },
        }
    }

    /// Separate the halves.
    pub fn split(self) -> (StreamReader, StreamWriter) {
        (self.reader, self.writer)
    }
}

/// Read half: decoded records in log order.
///
/// Undecodable entries are skipped (dispatch reports them on the status
/// channel). Ends when the emitter closes.
#[derive(Debug)]
pub struct StreamReader {
    records: ReceiverStream<DecodedEvent>,
    task: JoinHandle<()>,
}

impl StreamReader {
    fn open(log: EventLog, cursor: Cursor, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        // Pin the start now, so "now" means the moment the stream was opened.
        let start = log.start_position(cursor);

        let task = tokio::spawn(async move {
            let since = match start {
                Some(since) => since,
                None => match log.resolve(cursor).await {
                    Ok(since) => since,
                    Err(e) => {
                        warn!(error = %e, "[stream] Stream cannot start");
                        return;
                    }
                },
            };
            debug!(?cursor, since, "[stream] Stream reading");

            let mut feed = log.feed(since);
            while let Some(next) = feed.next().await {
                let entry = match next {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "[stream] Stream feed failed");
                        continue;
                    }
                };
                match log.decode(&entry) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(failure) => {
                        debug!(change = entry.change, error = %failure.error, "[stream] Stream skipped entry");
                    }
                }
            }
        });

        Self {
            records: ReceiverStream::new(rx),
            task,
        }
    }

    /// Next record, or `None` once the stream ended.
    pub async fn recv(&mut self) -> Option<DecodedEvent> {
        self.records.next().await
    }

    /// Stop reading. Buffered records can still be received.
    pub fn close(&mut self) {
        self.task.abort();
        self.records.close();
    }
}

impl Stream for StreamReader {
    type Item = DecodedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.records).poll_next(cx)
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Write half: every record sent is emitted.
#[derive(Debug)]
pub struct StreamWriter {
    emitter: HyperEmitter,
    closed: bool,
}

impl StreamWriter {
    /// Emit `event`.
    pub async fn send(&mut self, event: DecodedEvent) -> Result<(), EmitterError> {
        if self.closed {
            return Err(EmitterError::StreamClosed);
        }
        self.emitter.emit(&event.name, event.payload).await
    }

    /// Refuse further writes.
    pub fn close(&mut self) {
        self.closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
