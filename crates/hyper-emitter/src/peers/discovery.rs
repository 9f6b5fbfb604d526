//! # Peer Discovery
//!
//! A node that listens announces its endpoints as an `EventPeer` event on the
//! bus itself. The announcement replicates like any other event, and every
//! node that receives it dials the announced address.

use crate::adapters::event_log::EventLog;
use crate::adapters::metadata::NodeMetadata;
use crate::dispatch::{Completion, Handler};
use crate::errors::{EmitterError, HandlerError};
use crate::peers::addresses;
use crate::peers::manager::PeerManager;
use shared_types::{DecodedEvent, EventPeer, Payload, EVENT_PEER_MESSAGE};
use std::sync::Arc;
use tracing::{debug, info};

/// Emit this node's announcement for a listener bound on `host:port`,
/// unless the identical announcement was already emitted.
///
/// Returns whether an event was emitted.
pub(crate) async fn announce(
    log: &EventLog,
    metadata: &NodeMetadata,
    host: &str,
    port: u16,
) -> Result<bool, EmitterError> {
    let announcement = EventPeer::new(metadata.id().await?, addresses::advertised(host, port));
    if metadata.announcement().await?.as_ref() == Some(&announcement) {
        debug!(host, port, "[peers] Announcement unchanged, not re-emitting");
        return Ok(false);
    }

    let value = serde_json::to_value(&announcement)
        .map_err(|e| EmitterError::Protocol(e.to_string()))?;
    log.append(EVENT_PEER_MESSAGE, Payload::Decoded(value)).await?;
    metadata.save_announcement(&announcement).await?;

    info!(id = %announcement.id, addresses = announcement.addresses.len(), "[peers] Announced endpoints");
    Ok(true)
}

/// Listener for `EventPeer` that dials every announced node but this one.
///
/// The connection is started in the background; the listener completes as
/// soon as the announcement is checked.
pub(crate) fn gossip_handler(peers: PeerManager, metadata: Arc<NodeMetadata>) -> Handler {
    Handler::Async(Arc::new(move |event: DecodedEvent, completion: Completion| {
        let peers = peers.clone();
        let metadata = Arc::clone(&metadata);
        tokio::spawn(async move {
            completion.finish(on_announcement(&peers, &metadata, &event).await);
        });
    }))
}

async fn on_announcement(
    peers: &PeerManager,
    metadata: &NodeMetadata,
    event: &DecodedEvent,
) -> Result<(), HandlerError> {
    let value = event
        .value()
        .ok_or_else(|| HandlerError::new("EventPeer payload was not decoded"))?;
    let announcement: EventPeer =
        serde_json::from_value(value.clone()).map_err(|e| HandlerError::new(e.to_string()))?;

    let own = metadata
        .id()
        .await
        .map_err(|e| HandlerError::new(e.to_string()))?;
    if announcement.id == own {
        return Ok(());
    }

    let Some(address) = announcement.primary_address() else {
        debug!(id = %announcement.id, "[peers] Announcement without addresses");
        return Ok(());
    };
    let port = u16::try_from(address.port)
        .map_err(|_| HandlerError::new(format!("invalid announced port {}", address.port)))?;

    let host = address.ip.clone();
    let peers = peers.clone();
    debug!(id = %announcement.id, %host, port, "[peers] Discovered peer");
    tokio::spawn(async move {
        if let Err(e) = peers.connect(&host, port).await {
            debug!(%host, port, error = %e, "[peers] Discovered peer unreachable");
        }
    });
    Ok(())
}
