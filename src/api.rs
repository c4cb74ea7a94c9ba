//! Read-only HTTP endpoints.
//!
//! Presenter screens and tooling poll these instead of holding a socket.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::protocol::ServerMessage;
use crate::scoring::{self, LeaderboardEntry};
use crate::state::AppState;

/// Current session document.
///
/// GET /api/session
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<ServerMessage> {
    let session = state.store.snapshot().await;
    Json(ServerMessage::snapshot(session, state.store.server_timestamp()))
}

/// Standings from the elimination record, winner first.
///
/// GET /api/leaderboard
pub async fn get_leaderboard(State(state): State<Arc<AppState>>) -> Json<Vec<LeaderboardEntry>> {
    Json(scoring::leaderboard(&state.store.snapshot().await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_session_returns_snapshot() {
        let state = Arc::new(AppState::default());
        let Json(msg) = get_session(State(state.clone())).await;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "snapshot");
        assert_eq!(json["phase"], "IDLE");

        let Json(board) = get_leaderboard(State(state)).await;
        assert!(board.is_empty());
    }
}
