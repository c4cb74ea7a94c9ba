//! Player message handlers
//!
//! Identity writes and answer submission. Any role may send these; the
//! session decides whether the submission counts.

use crate::protocol::ServerMessage;
use crate::session::SessionPeer;
use crate::types::QuestionId;
use std::sync::Arc;

use super::handlers::{error_message, reply};

pub async fn handle_join(peer: &Arc<SessionPeer>, name: String) -> Option<ServerMessage> {
    tracing::info!("Player {} joining as {}", peer.id(), name);
    reply("join", peer.join(&name).await)
}

pub async fn handle_set_photo(peer: &Arc<SessionPeer>, url: String) -> Option<ServerMessage> {
    reply("set_photo", peer.set_photo(&url).await)
}

pub async fn handle_submit_answer(
    peer: &Arc<SessionPeer>,
    question_id: QuestionId,
    answer: String,
) -> Option<ServerMessage> {
    tracing::debug!("Answer from {} for {}: {}", peer.id(), question_id, answer);
    match peer.submit_answer(&question_id, &answer).await {
        Ok(outcome) => Some(ServerMessage::AnswerStatus { outcome }),
        Err(e) => Some(error_message(&e)),
    }
}
