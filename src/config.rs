//! Game tuning configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::questions::FallbackBank;

/// Host-configurable fuse range for duration-carrying modes
pub const MIN_FUSE_MS: u64 = 10_000;
pub const MAX_FUSE_MS: u64 = 60_000;

/// Players needed before a game can be prepared
pub const MIN_PLAYERS: usize = 2;

/// Reference fuse length used to scale the question buffer
const BUFFER_FUSE_UNIT_MS: f64 = 15_000.0;

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Lobby cap
    pub max_players: usize,
    pub questions_per_player: u32,
    pub questions_base_count: u32,
    pub min_prepared_questions: u32,
    pub max_prepared_questions: u32,
    /// How many recent question texts are sent to backends as "avoid"
    pub avoid_recent_questions: usize,
    pub question_batch_size: u32,
    pub countdown: Duration,
    pub tick_interval: Duration,
    pub generation_timeout: Duration,
    pub generation_attempts: u32,
    pub generation_retry_delay: Duration,
    pub generation_max_tokens: Option<u32>,
    /// Optional JSON file replacing the built-in fallback bank
    pub question_bank_path: Option<PathBuf>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players: 25,
            questions_per_player: 3,
            questions_base_count: 5,
            min_prepared_questions: 20,
            max_prepared_questions: 100,
            avoid_recent_questions: 50,
            question_batch_size: 15,
            countdown: Duration::from_millis(3_000),
            tick_interval: Duration::from_millis(1_000),
            generation_timeout: Duration::from_secs(12),
            generation_attempts: 3,
            generation_retry_delay: Duration::from_millis(1_000),
            generation_max_tokens: None,
            question_bank_path: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl GameConfig {
    /// Load configuration from environment variables, keeping defaults for
    /// anything unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut config = Self {
            max_players: env_parse("MAX_PLAYERS").unwrap_or(defaults.max_players),
            questions_per_player: env_parse("QUESTIONS_PER_PLAYER")
                .unwrap_or(defaults.questions_per_player),
            questions_base_count: env_parse("QUESTIONS_BASE_COUNT")
                .unwrap_or(defaults.questions_base_count),
            min_prepared_questions: env_parse("MIN_PREPARED_QUESTIONS")
                .unwrap_or(defaults.min_prepared_questions),
            max_prepared_questions: env_parse("MAX_PREPARED_QUESTIONS")
                .unwrap_or(defaults.max_prepared_questions),
            avoid_recent_questions: env_parse("AVOID_RECENT_QUESTIONS")
                .unwrap_or(defaults.avoid_recent_questions),
            question_batch_size: env_parse::<u32>("QUESTION_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.question_batch_size),
            countdown: env_parse("COUNTDOWN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown),
            tick_interval: env_parse::<u64>("TICK_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            generation_timeout: defaults.generation_timeout,
            generation_attempts: env_parse("GENERATION_ATTEMPTS")
                .unwrap_or(defaults.generation_attempts),
            generation_retry_delay: env_parse("GENERATION_RETRY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.generation_retry_delay),
            generation_max_tokens: defaults.generation_max_tokens,
            question_bank_path: std::env::var("QUESTION_BANK_PATH")
                .ok()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        };

        if config.min_prepared_questions > config.max_prepared_questions {
            tracing::warn!(
                "MIN_PREPARED_QUESTIONS ({}) exceeds MAX_PREPARED_QUESTIONS ({}), clamping",
                config.min_prepared_questions,
                config.max_prepared_questions
            );
            config.min_prepared_questions = config.max_prepared_questions;
        }

        tracing::info!(
            max_players = config.max_players,
            batch_size = config.question_batch_size,
            min_prepared = config.min_prepared_questions,
            max_prepared = config.max_prepared_questions,
            "Game config loaded"
        );

        config
    }

    /// Fallback bank from `question_bank_path`, or the built-in one
    pub fn fallback_bank(&self) -> FallbackBank {
        match &self.question_bank_path {
            Some(path) => FallbackBank::load_or_default(path),
            None => FallbackBank::default(),
        }
    }

    /// Questions to prepare for a round: grows with the player count and with
    /// fuse length (relative to 15s), clamped to the configured range
    pub fn target_question_count(&self, player_count: usize, fuse_ms: u64) -> u32 {
        let fuse_factor = (fuse_ms as f64 / BUFFER_FUSE_UNIT_MS).max(1.0);
        let per_players = player_count as f64 * self.questions_per_player as f64 * fuse_factor;
        let raw = self.questions_base_count as f64 + per_players.ceil();
        let min = self.min_prepared_questions.min(self.max_prepared_questions);
        (raw as u32).clamp(min, self.max_prepared_questions)
    }
}
