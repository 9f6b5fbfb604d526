//! # Event Log Adapter
//!
//! Wraps the causal log with the envelope format and the codec registry.
//! Encoding happens on `append`; decoding is shared by dispatch and streams.

use crate::errors::EmitterError;
use hb_01_codec_registry::CodecRegistry;
use hb_02_causal_log::{CausalLog, ChangeFeed, LogEntry};
use shared_bus::StatusEvent;
use shared_types::{Cursor, DecodedEvent, Envelope, Payload};
use tracing::trace;

/// Why a log entry could not be turned into a `DecodedEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    /// Event name, if the envelope itself was readable.
    pub name: Option<String>,
    pub error: String,
}

impl From<DecodeFailure> for StatusEvent {
    fn from(failure: DecodeFailure) -> Self {
        StatusEvent::DecodeError {
            name: failure.name,
            error: failure.error,
        }
    }
}

/// The log as seen by the emitter.
#[derive(Clone, Debug)]
pub struct EventLog {
    log: CausalLog,
    codecs: CodecRegistry,
}

impl EventLog {
    /// Create an adapter over `log` using `codecs`.
    pub fn new(log: CausalLog, codecs: CodecRegistry) -> Self {
        Self { log, codecs }
    }

    /// The underlying causal log.
    pub fn log(&self) -> &CausalLog {
        &self.log
    }

    /// The live codec registry.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Wait for the log to load.
    pub async fn ready(&self) -> Result<(), EmitterError> {
        Ok(self.log.ready().await?)
    }

    /// Build the envelope bytes for an event.
    ///
    /// Decoded payloads go through the codec registered for `name`; raw
    /// payloads are stored as given.
    pub fn encode(&self, name: &str, payload: Payload) -> Result<Vec<u8>, EmitterError> {
        let bytes = match payload {
            Payload::Decoded(value) => {
                let codec = self
                    .codecs
                    .lookup(name)
                    .ok_or_else(|| EmitterError::MissingCodec(name.to_string()))?;
                codec.encode(&value)?
            }
            Payload::Raw(bytes) => bytes,
        };
        Ok(Envelope::new(name, bytes).to_bytes())
    }

    /// Encode and append an event.
    pub async fn append(&self, name: &str, payload: Payload) -> Result<LogEntry, EmitterError> {
        let envelope = self.encode(name, payload)?;
        let entry = self.log.append(envelope).await?;
        trace!(name, change = entry.change, "[emitter] Appended event");
        Ok(entry)
    }

    /// Split an entry into name and payload, decoding the payload when a
    /// codec exists for the name.
    pub fn decode(&self, entry: &LogEntry) -> Result<DecodedEvent, DecodeFailure> {
        let envelope = Envelope::from_bytes(&entry.value).map_err(|e| DecodeFailure {
            name: None,
            error: e.to_string(),
        })?;

        let payload = match self.codecs.lookup(&envelope.name) {
            Some(codec) => Payload::Decoded(codec.decode(&envelope.payload).map_err(|e| {
                DecodeFailure {
                    name: Some(envelope.name.clone()),
                    error: e.to_string(),
                }
            })?),
            None => Payload::Raw(envelope.payload),
        };

        Ok(DecodedEvent {
            name: envelope.name,
            payload,
        })
    }

    /// The change position a feed at `cursor` starts after, if it can be
    /// known yet. `Now` is unknown until the log has loaded.
    pub fn start_position(&self, cursor: Cursor) -> Option<u64> {
        match cursor {
            Cursor::Beginning => Some(0),
            Cursor::Now => self.log.position_now(),
        }
    }

    /// Resolve `cursor` to a start position, waiting for the log if needed.
    pub async fn resolve(&self, cursor: Cursor) -> Result<u64, EmitterError> {
        if let Some(position) = self.start_position(cursor) {
            return Ok(position);
        }
        self.ready().await?;
        Ok(self.start_position(cursor).unwrap_or(0))
    }

    /// Live feed of entries after `since`.
    pub fn feed(&self, since: u64) -> ChangeFeed {
        self.log.changes(since, true)
    }

    /// Close the log and the store under it.
    pub async fn close(&self) -> Result<(), EmitterError> {
        Ok(self.log.close().await?)
    }
}
