use crate::fuse::FuseMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque ID types for type safety
pub type ClientId = String;
pub type PlayerId = ClientId;
pub type QuestionId = String;
pub type EliminationKey = String;

/// A multiple-choice trivia question with exactly four options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    /// Always equal to one of `options` once the question has been validated
    pub correct_answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Alive,
    Eliminated,
}

/// Per-round statistics for one participant
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub questions_answered: u32,
    pub bomb_receives: u32,
    /// Accumulated hold time in milliseconds
    pub bomb_hold_time: u64,
    /// Server timestamp when the player last received the bomb (None when not holding)
    #[serde(default)]
    pub bomb_hold_start: Option<i64>,
    pub passes: u32,
    /// Passes made with less than five seconds left on the fuse
    pub close_calls: u32,
}

/// The single in-flight answer awaiting arbitration by the controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAnswer {
    pub submitter_id: PlayerId,
    pub question_id: QuestionId,
    pub answer: String,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Preparing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationProgress {
    pub current: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub theme: String,
    /// 1 = easy .. 5 = extreme
    pub difficulty: u8,
    pub language: String,
    pub tricky: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            theme: "General Knowledge".to_string(),
            difficulty: 1,
            language: "English".to_string(),
            tricky: false,
        }
    }
}

/// Settings captured by `prepare_game`, applied when the game starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingGameSettings {
    pub settings: GameSettings,
    pub fuse_mode: FuseMode,
}

/// Lifecycle phase derived from the session document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Idle,
    Preparing,
    Countdown,
    Active,
    GameOver,
}

/// The replicated session document shared by every peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub controller_id: Option<ClientId>,
    pub host_ids: Vec<ClientId>,
    pub started: bool,
    pub countdown_end_time: Option<i64>,
    pub players: BTreeMap<PlayerId, Player>,
    pub question_generation_status: GenerationStatus,
    pub question_generation_progress: GenerationProgress,
    pub pending_game_settings: Option<PendingGameSettings>,
    pub fuse_mode: FuseMode,
    /// Current fuse duration in milliseconds
    pub fuse_duration: u64,
    pub reset_on_pass: bool,
    pub bomb_holder_id: Option<PlayerId>,
    pub bomb_explosion_time: Option<i64>,
    pub current_question: Option<Question>,
    /// Only the size of the controller-local pool is replicated
    pub prepared_question_count: u32,
    pub pending_answer: Option<PendingAnswer>,
    pub player_status: BTreeMap<PlayerId, PlayerStatus>,
    pub player_stats: BTreeMap<PlayerId, PlayerStats>,
    pub elimination_order: BTreeMap<EliminationKey, PlayerId>,
    pub game_settings: GameSettings,
    pub winner_id: Option<PlayerId>,
}

impl Default for Session {
    fn default() -> Self {
        let fuse_mode = FuseMode::default();
        Self {
            controller_id: None,
            host_ids: Vec::new(),
            started: false,
            countdown_end_time: None,
            players: BTreeMap::new(),
            question_generation_status: GenerationStatus::Idle,
            question_generation_progress: GenerationProgress::default(),
            pending_game_settings: None,
            fuse_duration: fuse_mode.base_duration_ms(),
            reset_on_pass: fuse_mode.resets_on_pass(),
            fuse_mode,
            bomb_holder_id: None,
            bomb_explosion_time: None,
            current_question: None,
            prepared_question_count: 0,
            pending_answer: None,
            player_status: BTreeMap::new(),
            player_stats: BTreeMap::new(),
            elimination_order: BTreeMap::new(),
            game_settings: GameSettings::default(),
            winner_id: None,
        }
    }
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        if self.started {
            if self.countdown_end_time.is_some() {
                SessionPhase::Countdown
            } else {
                SessionPhase::Active
            }
        } else if self.question_generation_status == GenerationStatus::Preparing {
            SessionPhase::Preparing
        } else if self.winner_id.is_some() {
            SessionPhase::GameOver
        } else {
            SessionPhase::Idle
        }
    }

    /// Whether the bomb is live (round started and countdown finished)
    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    pub fn is_controller(&self, client_id: &str) -> bool {
        self.controller_id.as_deref() == Some(client_id)
    }

    pub fn is_alive(&self, player_id: &str) -> bool {
        self.player_status.get(player_id) == Some(&PlayerStatus::Alive)
    }

    /// Alive round participants in stable (id) order
    pub fn alive_players(&self) -> Vec<PlayerId> {
        self.player_status
            .iter()
            .filter(|(_, status)| **status == PlayerStatus::Alive)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn eliminated_count(&self) -> usize {
        self.player_status
            .values()
            .filter(|status| **status == PlayerStatus::Eliminated)
            .count()
    }

    /// Number of players that took part in the current round
    pub fn participant_count(&self) -> usize {
        self.player_status.len()
    }

    pub fn player_name(&self, player_id: &str) -> Option<&str> {
        self.players.get(player_id).map(|p| p.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
    Presenter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_derivation() {
        let mut session = Session::default();
        assert_eq!(session.phase(), SessionPhase::Idle);

        session.question_generation_status = GenerationStatus::Preparing;
        assert_eq!(session.phase(), SessionPhase::Preparing);

        session.question_generation_status = GenerationStatus::Ready;
        session.started = true;
        session.countdown_end_time = Some(1_000);
        assert_eq!(session.phase(), SessionPhase::Countdown);

        session.countdown_end_time = None;
        assert_eq!(session.phase(), SessionPhase::Active);

        session.started = false;
        session.winner_id = Some("p1".to_string());
        assert_eq!(session.phase(), SessionPhase::GameOver);
    }

    #[test]
    fn test_document_uses_camel_case_keys() {
        let json = serde_json::to_value(Session::default()).unwrap();
        assert!(json.get("bombExplosionTime").is_some());
        assert!(json.get("questionGenerationStatus").is_some());
        assert_eq!(json["questionGenerationStatus"], "idle");
        assert!(json.get("eliminationOrder").is_some());
    }
}
