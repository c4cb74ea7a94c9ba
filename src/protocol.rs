use crate::scoring::LeaderboardEntry;
use crate::session::{PrepareRequest, SubmitOutcome};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        name: String,
    },
    SetPhoto {
        url: String,
    },
    SubmitAnswer {
        question_id: QuestionId,
        answer: String,
    },
    RequestLeaderboard,
    // Host-only messages
    HostPrepareGame(PrepareRequest),
    HostStartGame,
    HostStopGame,
    HostCancelPreparation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        client_id: ClientId,
        role: Role,
        session: Session,
        server_now: i64,
    },
    /// Full document after every change
    Snapshot {
        session: Session,
        phase: SessionPhase,
        server_now: i64,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    AnswerStatus {
        outcome: SubmitOutcome,
    },
    Ack {
        action: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn snapshot(session: Session, server_now: i64) -> Self {
        ServerMessage::Snapshot {
            phase: session.phase(),
            session,
            server_now,
        }
    }

    pub fn ack(action: &str) -> Self {
        ServerMessage::Ack {
            action: action.to_string(),
        }
    }

    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}
