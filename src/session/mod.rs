//! Session authority: the actions one peer can take against the shared
//! document, and the controller-only logic that drives the game.

mod answer;
mod bomb;
mod guard;
mod lifecycle;
mod player;
mod prepare;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::GameConfig;
use crate::questions::{QuestionGenerator, SharedPool};
use crate::scoring::{self, LeaderboardEntry};
use crate::store::{SessionStore, StoreError};
use crate::types::*;

pub use answer::{Arbitration, SubmitOutcome};
pub use bomb::ExplosionOutcome;
pub use guard::{ExplosionGuard, ExplosionPermit, EXPLOSION_OVERDUE_MS, EXPLOSION_TIMEOUT};
pub use prepare::{PrepareOutcome, PrepareRequest};

/// Result type for session actions
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Only the controller can {0}")]
    NotController(&'static str),

    #[error("Only a host can {0}")]
    NotHost(&'static str),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Questions are not ready")]
    NotReady,

    #[error("Lobby is full ({0} players)")]
    LobbyFull(usize),

    #[error("Question generation failed: {0}")]
    GenerationFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Stable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotController(_) => "NOT_CONTROLLER",
            SessionError::NotHost(_) => "UNAUTHORIZED",
            SessionError::InvalidState(_) => "INVALID_STATE",
            SessionError::InvalidInput(_) => "INVALID_INPUT",
            SessionError::NotReady => "NOT_READY",
            SessionError::LobbyFull(_) => "LOBBY_FULL",
            SessionError::GenerationFailed(_) => "GENERATION_FAILED",
            SessionError::Timeout(_) => "TIMEOUT",
            SessionError::Store(_) => "STORE_ERROR",
        }
    }
}

/// One participant's view of the session.
///
/// Every peer (host, player, presenter) gets one. Controller-only actions
/// check the recorded controller before writing; the controller-local question
/// pool and explosion guard live here rather than in the document.
pub struct SessionPeer {
    id: ClientId,
    role: Role,
    store: Arc<dyn SessionStore>,
    generator: Arc<QuestionGenerator>,
    config: Arc<GameConfig>,
    pool: SharedPool,
    explosion_guard: ExplosionGuard,
    /// Bumped to abort whatever preparation is running
    preparation: watch::Sender<u64>,
}

impl SessionPeer {
    pub fn new(
        id: impl Into<ClientId>,
        role: Role,
        store: Arc<dyn SessionStore>,
        generator: Arc<QuestionGenerator>,
        config: Arc<GameConfig>,
    ) -> Self {
        let (preparation, _rx) = watch::channel(0);
        Self {
            id: id.into(),
            role,
            store,
            generator,
            config,
            pool: SharedPool::default(),
            explosion_guard: ExplosionGuard::default(),
            preparation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Questions currently held in this peer's local pool
    pub fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }

    pub async fn snapshot(&self) -> Session {
        self.store.snapshot().await
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        scoring::leaderboard(&self.store.snapshot().await)
    }

    fn now(&self) -> i64 {
        self.store.server_timestamp()
    }

    fn require_host(&self, action: &'static str) -> SessionResult<()> {
        if self.role != Role::Host {
            return Err(SessionError::NotHost(action));
        }
        Ok(())
    }

    /// Snapshot, provided this peer is the recorded controller
    async fn require_controller(&self, action: &'static str) -> SessionResult<Session> {
        self.require_host(action)?;
        let session = self.store.snapshot().await;
        if !session.is_controller(&self.id) {
            return Err(SessionError::NotController(action));
        }
        Ok(session)
    }

    /// One controller tick: drop a pool the session no longer needs, finish
    /// the countdown, arbitrate a pending answer and detect fuse expiry.
    /// A no-op on non-controllers.
    pub async fn tick(&self) -> SessionResult<()> {
        let session = self.store.snapshot().await;
        if !session.is_controller(&self.id) {
            return Ok(());
        }
        self.discard_stale_pool().await?;
        let now = self.now();

        if session
            .countdown_end_time
            .is_some_and(|end| session.started && now >= end)
        {
            self.begin_round().await?;
        }

        if session.pending_answer.is_some() {
            self.handle_pending_answer().await?;
        }

        let session = self.store.snapshot().await;
        if session.is_active()
            && session
                .bomb_explosion_time
                .is_some_and(|deadline| now >= deadline)
        {
            self.handle_explosion().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::{transact, ManualClock, MemoryStore};

    pub struct Harness {
        pub clock: Arc<ManualClock>,
        pub store: Arc<MemoryStore>,
        pub config: Arc<GameConfig>,
        pub generator: Arc<QuestionGenerator>,
    }

    impl Harness {
        pub fn new() -> Self {
            let clock = Arc::new(ManualClock::new(1_000_000));
            let store = Arc::new(MemoryStore::new(clock.clone()));
            let config = Arc::new(GameConfig {
                generation_retry_delay: Duration::ZERO,
                ..GameConfig::default()
            });
            let generator = Arc::new(QuestionGenerator::offline(&config));
            Self {
                clock,
                store,
                config,
                generator,
            }
        }

        pub fn peer(&self, id: &str, role: Role) -> SessionPeer {
            SessionPeer::new(
                id,
                role,
                self.store.clone(),
                self.generator.clone(),
                self.config.clone(),
            )
        }

        /// Controller "h1" plus the given joined players
        pub async fn with_controller(&self, players: &[&str]) -> SessionPeer {
            let host = self.peer("h1", Role::Host);
            transact(self.store.as_ref(), |s| {
                s.host_ids = vec!["h1".to_string()];
                s.controller_id = Some("h1".to_string());
            })
            .await
            .unwrap();
            for id in players {
                self.peer(id, Role::Player).join(&id.to_uppercase()).await.unwrap();
            }
            host
        }

        /// Prepare, start and finish the countdown
        pub async fn running_game(&self, players: &[&str], mode: RoundSetup) -> SessionPeer {
            let host = self.with_controller(players).await;
            host.prepare_game(mode.request()).await.unwrap();
            host.start_game().await.unwrap();
            self.clock.advance(self.config.countdown);
            host.tick().await.unwrap();
            host
        }
    }

    pub struct RoundSetup {
        pub duration_ms: u64,
        pub reset_on_pass: bool,
    }

    impl RoundSetup {
        pub fn fixed(duration_ms: u64) -> Self {
            Self {
                duration_ms,
                reset_on_pass: true,
            }
        }

        pub fn request(&self) -> PrepareRequest {
            PrepareRequest {
                theme: "General Knowledge".to_string(),
                language: "English".to_string(),
                fuse_duration_ms: self.duration_ms,
                reset_on_pass: self.reset_on_pass,
                difficulty: 1,
                tricky: false,
                fuse_mode: None,
            }
        }
    }
}
