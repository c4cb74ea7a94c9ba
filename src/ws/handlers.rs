//! WebSocket message dispatch
//!
//! This module provides the main entry point for handling client messages.
//! Host-only commands are rejected here before reaching the session; whether
//! a host is also the controller is checked by the session itself.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{SessionError, SessionPeer};
use crate::types::Role;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{host, player};

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($peer:expr, $action:expr) => {
        if *$peer.role() != Role::Host {
            return Some(ServerMessage::error(
                "UNAUTHORIZED",
                format!("Only host can {}", $action),
            ));
        }
    };
}

/// Turn a session error into the message sent back to the client
pub fn error_message(e: &SessionError) -> ServerMessage {
    ServerMessage::error(e.code(), e.to_string())
}

/// Ack on success, error message otherwise
pub(crate) fn reply(action: &str, result: Result<(), SessionError>) -> Option<ServerMessage> {
    match result {
        Ok(()) => Some(ServerMessage::ack(action)),
        Err(e) => {
            tracing::warn!("{} failed: {}", action, e);
            Some(error_message(&e))
        }
    }
}

/// Handle client messages and return optional response.
///
/// `outbox` receives results of commands that finish after this call returns.
pub async fn handle_message(
    msg: ClientMessage,
    peer: &Arc<SessionPeer>,
    outbox: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<ServerMessage> {
    match msg {
        // Player messages
        ClientMessage::Join { name } => player::handle_join(peer, name).await,

        ClientMessage::SetPhoto { url } => player::handle_set_photo(peer, url).await,

        ClientMessage::SubmitAnswer {
            question_id,
            answer,
        } => player::handle_submit_answer(peer, question_id, answer).await,

        ClientMessage::RequestLeaderboard => Some(ServerMessage::Leaderboard {
            entries: peer.leaderboard().await,
        }),

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::HostPrepareGame(request) => {
            check_host!(peer, "prepare games");
            host::handle_prepare_game(peer, request, outbox.clone())
        }

        ClientMessage::HostStartGame => {
            check_host!(peer, "start games");
            host::handle_start_game(peer).await
        }

        ClientMessage::HostStopGame => {
            check_host!(peer, "stop games");
            host::handle_stop_game(peer).await
        }

        ClientMessage::HostCancelPreparation => {
            check_host!(peer, "cancel preparation");
            host::handle_cancel_preparation(peer).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PrepareRequest;
    use crate::state::AppState;

    fn prepare_request() -> PrepareRequest {
        PrepareRequest {
            theme: "Animals".to_string(),
            language: "English".to_string(),
            fuse_duration_ms: 15_000,
            reset_on_pass: true,
            difficulty: 2,
            tricky: false,
            fuse_mode: None,
        }
    }

    #[tokio::test]
    async fn test_player_cannot_send_host_commands() {
        let state = AppState::default();
        let (outbox, _rx) = mpsc::unbounded_channel();
        let player = Arc::new(state.peer("p1", Role::Player));

        for msg in [
            ClientMessage::HostPrepareGame(prepare_request()),
            ClientMessage::HostStartGame,
            ClientMessage::HostStopGame,
            ClientMessage::HostCancelPreparation,
        ] {
            match handle_message(msg, &player, &outbox).await {
                Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "UNAUTHORIZED"),
                other => panic!("Expected UNAUTHORIZED, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_join_and_leaderboard() {
        let state = AppState::default();
        let (outbox, _rx) = mpsc::unbounded_channel();
        let player = Arc::new(state.peer("p1", Role::Player));

        let response = handle_message(
            ClientMessage::Join {
                name: "Alice".to_string(),
            },
            &player,
            &outbox,
        )
        .await;
        assert!(matches!(response, Some(ServerMessage::Ack { ref action }) if action == "join"));
        assert_eq!(state.store.snapshot().await.player_name("p1"), Some("Alice"));

        let response = handle_message(ClientMessage::RequestLeaderboard, &player, &outbox).await;
        assert!(matches!(response, Some(ServerMessage::Leaderboard { ref entries }) if entries.is_empty()));
    }

    #[tokio::test]
    async fn test_host_that_is_not_controller_gets_error() {
        let state = AppState::default();
        let (outbox, _rx) = mpsc::unbounded_channel();
        let host = Arc::new(state.peer("h1", Role::Host));

        match handle_message(ClientMessage::HostStartGame, &host, &outbox).await {
            Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NOT_CONTROLLER"),
            other => panic!("Expected NOT_CONTROLLER, got {:?}", other),
        }
    }
}
