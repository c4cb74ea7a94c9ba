//! Host-only command handlers
//!
//! All handlers in this module require the Host role.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::session::{PrepareOutcome, PrepareRequest, SessionPeer};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::handlers::{error_message, reply};

/// Preparation runs for several seconds, so it is spawned and reports back
/// through `outbox` once the pool is ready, failed or was cancelled.
pub fn handle_prepare_game(
    peer: &Arc<SessionPeer>,
    request: PrepareRequest,
    outbox: mpsc::UnboundedSender<ServerMessage>,
) -> Option<ServerMessage> {
    tracing::info!(
        "Host {} preparing game: theme={}, difficulty={}",
        peer.id(),
        request.theme,
        request.difficulty
    );
    let peer = peer.clone();
    tokio::spawn(async move {
        let msg = match peer.prepare_game(request).await {
            Ok(PrepareOutcome::Ready(count)) => {
                tracing::info!("Prepared {} questions", count);
                ServerMessage::ack("prepare_game")
            }
            Ok(PrepareOutcome::Cancelled) => ServerMessage::ack("prepare_cancelled"),
            Err(e) => {
                tracing::warn!("Preparation failed: {}", e);
                error_message(&e)
            }
        };
        // Socket may be gone by now
        let _ = outbox.send(msg);
    });
    None
}

pub async fn handle_start_game(peer: &Arc<SessionPeer>) -> Option<ServerMessage> {
    tracing::info!("Host {} starting game", peer.id());
    reply("start_game", peer.start_game().await)
}

pub async fn handle_stop_game(peer: &Arc<SessionPeer>) -> Option<ServerMessage> {
    tracing::info!("Host {} stopping game", peer.id());
    reply("stop_game", peer.stop_game().await)
}

pub async fn handle_cancel_preparation(peer: &Arc<SessionPeer>) -> Option<ServerMessage> {
    tracing::info!("Host {} cancelling preparation", peer.id());
    reply("cancel_preparation", peer.cancel_preparation().await)
}
