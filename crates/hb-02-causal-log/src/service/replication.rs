//! # Replication
//!
//! Two-way replication of a log over any byte stream. A session ends when
//! the remote closes the stream, when this log is closed, or on the first
//! error.

use crate::adapters::framing::{Frame, FrameCodec};
use crate::domain::entry::Heads;
use crate::domain::errors::LogError;
use crate::service::log::CausalLog;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

impl CausalLog {
    /// Replicate with the log at the other end of `socket`.
    ///
    /// Sends every entry the remote lacks, then every new local entry
    /// (including entries that arrive from other peers), while storing what
    /// the remote sends.
    pub async fn replicate<S>(&self, socket: S) -> Result<(), LogError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let id = self.id().await?;
        let (mut sink, mut frames) = Framed::new(socket, FrameCodec::new()).split::<Frame>();

        sink.send(Frame::Handshake {
            log_id: id.clone(),
            heads: self.heads().await?,
        })
        .await?;

        let remote_heads = match frames.next().await.transpose()? {
            Some(Frame::Handshake { log_id, heads }) => {
                if log_id == id {
                    return Err(LogError::SelfReplication(id));
                }
                debug!(local = %id, remote = %log_id, "[hb-02] Replication handshake complete");
                heads
            }
            Some(Frame::Entry { .. }) => {
                return Err(LogError::Protocol("expected handshake".to_string()))
            }
            None => {
                return Err(LogError::Io(
                    "connection closed during handshake".to_string(),
                ))
            }
        };

        // What the remote is known to hold, per origin
        let known: Arc<Mutex<Heads>> = Arc::new(Mutex::new(remote_heads));

        let push = {
            let known = Arc::clone(&known);
            let mut feed = self.changes(0, true);
            async move {
                while let Some(entry) = feed.next().await {
                    let entry = entry?;
                    {
                        let mut known = known.lock();
                        let head = known.get(&entry.origin).copied().unwrap_or(0);
                        if entry.seq <= head {
                            continue;
                        }
                        known.insert(entry.origin.clone(), entry.seq);
                    }
                    trace!(origin = %entry.origin, seq = entry.seq, "[hb-02] Sending entry");
                    sink.send(Frame::Entry {
                        origin: entry.origin,
                        seq: entry.seq,
                        value: entry.value,
                    })
                    .await?;
                }
                Ok(())
            }
        };

        let pull = async {
            while let Some(frame) = frames.next().await {
                match frame? {
                    Frame::Entry { origin, seq, value } => {
                        {
                            let mut known = known.lock();
                            let head = known.entry(origin.clone()).or_insert(0);
                            *head = (*head).max(seq);
                        }
                        trace!(%origin, seq, "[hb-02] Received entry");
                        self.insert_replicated(origin, seq, value).await?;
                    }
                    Frame::Handshake { .. } => {
                        return Err(LogError::Protocol("unexpected handshake".to_string()))
                    }
                }
            }
            Ok(())
        };

        tokio::select! {
            result = push => result,
            result = pull => result,
        }
    }
}
