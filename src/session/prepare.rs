use serde::Deserialize;
use tokio::sync::watch;

use super::{SessionError, SessionPeer, SessionResult};
use crate::config::{MAX_FUSE_MS, MIN_FUSE_MS, MIN_PLAYERS};
use crate::fuse::FuseMode;
use crate::store::transact;
use crate::types::*;

/// Host input for `prepare_game`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub theme: String,
    pub language: String,
    pub fuse_duration_ms: u64,
    pub reset_on_pass: bool,
    pub difficulty: u8,
    #[serde(default)]
    pub tricky: bool,
    /// Explicit fuse mode; overrides `fuse_duration_ms`/`reset_on_pass`
    #[serde(default)]
    pub fuse_mode: Option<FuseMode>,
}

impl PrepareRequest {
    pub fn mode(&self) -> FuseMode {
        self.fuse_mode
            .clone()
            .unwrap_or_else(|| FuseMode::from_reset_on_pass(self.fuse_duration_ms, self.reset_on_pass))
    }

    pub fn settings(&self) -> GameSettings {
        let defaults = GameSettings::default();
        let theme = self.theme.trim();
        let language = self.language.trim();
        GameSettings {
            theme: if theme.is_empty() {
                defaults.theme
            } else {
                theme.to_string()
            },
            difficulty: self.difficulty,
            language: if language.is_empty() {
                defaults.language
            } else {
                language.to_string()
            },
            tricky: self.tricky,
        }
    }

    fn validate(&self) -> SessionResult<()> {
        if !(1..=5).contains(&self.difficulty) {
            return Err(SessionError::InvalidInput(format!(
                "Difficulty must be between 1 and 5 (got {})",
                self.difficulty
            )));
        }
        self.mode()
            .validate(MIN_FUSE_MS, MAX_FUSE_MS)
            .map_err(SessionError::InvalidInput)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Pool filled; carries the prepared question count
    Ready(u32),
    /// Preparation was cancelled or superseded before finishing
    Cancelled,
}

/// Resolves once the preparation epoch moves past `epoch`
async fn superseded(mut rx: watch::Receiver<u64>, epoch: u64) {
    loop {
        if *rx.borrow_and_update() != epoch {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl SessionPeer {
    fn preparation_epoch(&self) -> u64 {
        *self.preparation.borrow()
    }

    /// Abort any running preparation on this peer
    pub(crate) fn abort_preparation(&self) {
        self.preparation.send_modify(|epoch| *epoch += 1);
    }

    /// Drop the local pool once the document shows nothing prepared or
    /// running, e.g. after another host cancelled or stopped the game.
    pub(crate) async fn discard_stale_pool(&self) -> SessionResult<()> {
        let session = self.store.snapshot().await;
        let idle = !session.started && session.question_generation_status == GenerationStatus::Idle;
        if !idle || self.pool.lock().is_empty() {
            return Ok(());
        }

        // Confirmed inside a transaction: a preparation only fills the pool
        // after its own `preparing` write has committed
        let pool = self.pool.clone();
        let discarded = transact(self.store.as_ref(), move |s| {
            if s.started || s.question_generation_status != GenerationStatus::Idle {
                return 0;
            }
            let mut pool = pool.lock();
            let len = pool.len();
            pool.clear();
            len
        })
        .await?;

        if discarded > 0 {
            tracing::info!("Session is idle, discarded {} local questions", discarded);
        }
        Ok(())
    }

    /// Fetch questions on demand when a running game finds the local pool
    /// empty, as after taking over control from another host.
    pub(crate) async fn refill_pool_if_empty(&self, session: &Session) {
        if !session.started || !self.pool.lock().is_empty() {
            return;
        }

        let mut avoid = self.pool.lock().avoid_texts();
        avoid.extend(session.current_question.as_ref().map(|q| q.text.clone()));
        let count = self.config.question_batch_size.max(1) as usize;
        let batch = self
            .generator
            .generate_batch(&session.game_settings, count, &avoid)
            .await;

        let mut pool = self.pool.lock();
        if pool.is_empty() {
            tracing::warn!(
                "Local question pool empty mid-game, fetched {} questions on demand",
                batch.len()
            );
            pool.extend(batch);
        }
    }

    /// Generate the question pool for the next round.
    ///
    /// Moves the session to `preparing`, fills the local pool batch by batch
    /// while reporting progress, and ends in `ready` (or `failed` when not even
    /// the minimum could be produced). Returns `Cancelled` if
    /// `cancel_preparation` or `stop_game` intervened.
    pub async fn prepare_game(&self, request: PrepareRequest) -> SessionResult<PrepareOutcome> {
        let session = self.require_controller("prepare a game").await?;
        request.validate()?;
        if session.started {
            return Err(SessionError::InvalidState(
                "Game is already running".to_string(),
            ));
        }
        if session.question_generation_status == GenerationStatus::Preparing {
            return Err(SessionError::InvalidState(
                "Preparation already in progress".to_string(),
            ));
        }
        if session.players.len() < MIN_PLAYERS {
            return Err(SessionError::InvalidState(format!(
                "At least {} players are needed (have {})",
                MIN_PLAYERS,
                session.players.len()
            )));
        }

        let mode = request.mode();
        let settings = request.settings();
        let target = self
            .config
            .target_question_count(session.players.len(), mode.base_duration_ms());

        self.abort_preparation();
        let epoch = self.preparation_epoch();
        self.pool.lock().clear();

        let pending = PendingGameSettings {
            settings: settings.clone(),
            fuse_mode: mode,
        };
        let began = transact(self.store.as_ref(), move |s| {
            if s.started || s.question_generation_status == GenerationStatus::Preparing {
                return false;
            }
            s.question_generation_status = GenerationStatus::Preparing;
            s.question_generation_progress = GenerationProgress {
                current: 0,
                total: target,
            };
            s.prepared_question_count = 0;
            s.pending_game_settings = Some(pending.clone());
            true
        })
        .await?;
        if !began {
            return Err(SessionError::InvalidState(
                "Session changed while preparing".to_string(),
            ));
        }

        tracing::info!(
            "Preparing {} questions (theme: {}, difficulty: {})",
            target,
            settings.theme,
            settings.difficulty
        );

        let outcome = self.fill_pool(&settings, target, epoch).await;

        if let Ok(PrepareOutcome::Cancelled) = outcome {
            // A newer preparation owns the pool now
            if self.preparation_epoch() == epoch {
                self.pool.lock().clear();
            }
            tracing::info!("Preparation cancelled");
        }
        outcome
    }

    async fn fill_pool(
        &self,
        settings: &GameSettings,
        target: u32,
        epoch: u64,
    ) -> SessionResult<PrepareOutcome> {
        let batch_size = self.config.question_batch_size.max(1);
        let max_batches = target.div_ceil(batch_size) + self.config.generation_attempts;
        let minimum = self.config.min_prepared_questions.min(target);

        for batch_no in 1..=max_batches {
            let have = self.pool.lock().len() as u32;
            if have >= target {
                break;
            }

            // Someone else may have flipped the status (cancel, stop)
            let session = self.store.snapshot().await;
            if session.question_generation_status != GenerationStatus::Preparing
                || self.preparation_epoch() != epoch
            {
                return Ok(PrepareOutcome::Cancelled);
            }

            let count = (target - have).min(batch_size) as usize;
            let avoid = self.pool.lock().avoid_texts();
            let batch = tokio::select! {
                batch = self.generator.generate_batch(settings, count, &avoid) => batch,
                _ = superseded(self.preparation.subscribe(), epoch) => {
                    return Ok(PrepareOutcome::Cancelled)
                }
            };

            let prepared = {
                let mut pool = self.pool.lock();
                // Checked under the pool lock so a concurrent cancel cannot
                // clear the pool before this batch lands
                if self.preparation_epoch() != epoch {
                    return Ok(PrepareOutcome::Cancelled);
                }
                pool.extend(batch);
                pool.len() as u32
            };
            tracing::debug!("Batch {}: {}/{} questions prepared", batch_no, prepared, target);

            let still_preparing = transact(self.store.as_ref(), move |s| {
                if s.question_generation_status != GenerationStatus::Preparing {
                    return false;
                }
                s.question_generation_progress = GenerationProgress {
                    current: prepared.min(target),
                    total: target,
                };
                s.prepared_question_count = prepared;
                true
            })
            .await?;
            if !still_preparing {
                return Ok(PrepareOutcome::Cancelled);
            }
        }

        let prepared = self.pool.lock().len() as u32;
        let ready = prepared >= minimum;
        let finished = transact(self.store.as_ref(), move |s| {
            if s.question_generation_status != GenerationStatus::Preparing {
                return false;
            }
            s.question_generation_status = if ready {
                GenerationStatus::Ready
            } else {
                GenerationStatus::Failed
            };
            s.question_generation_progress = GenerationProgress {
                current: prepared.min(target),
                total: target,
            };
            s.prepared_question_count = prepared;
            true
        })
        .await?;

        if !finished {
            return Ok(PrepareOutcome::Cancelled);
        }
        if !ready {
            self.pool.lock().clear();
            tracing::error!("Only {} of {} required questions prepared", prepared, minimum);
            return Err(SessionError::GenerationFailed(format!(
                "only {} of {} required questions",
                prepared, minimum
            )));
        }

        tracing::info!("Question pool ready with {} questions", prepared);
        Ok(PrepareOutcome::Ready(prepared))
    }

    /// Abort preparation and return to idle. Safe to call repeatedly; leaves
    /// a running game untouched. When a backup host cancels, the controller
    /// drops its pool on its next tick.
    pub async fn cancel_preparation(&self) -> SessionResult<()> {
        self.require_host("cancel preparation")?;
        self.abort_preparation();

        let cancelled = transact(self.store.as_ref(), |s| {
            if s.started {
                return false;
            }
            s.question_generation_status = GenerationStatus::Idle;
            s.question_generation_progress = GenerationProgress::default();
            s.prepared_question_count = 0;
            s.pending_game_settings = None;
            true
        })
        .await?;

        if cancelled {
            self.pool.lock().clear();
            tracing::info!("Preparation cancelled by {}", self.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::store::SessionStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_request_mode_and_settings() {
        let mut request = RoundSetup::fixed(20_000).request();
        request.theme = "  ".to_string();
        assert_eq!(request.mode(), FuseMode::Fixed { duration_ms: 20_000 });
        assert_eq!(request.settings().theme, "General Knowledge");

        request.reset_on_pass = false;
        assert_eq!(request.mode(), FuseMode::HotPotato { duration_ms: 20_000 });

        request.fuse_mode = Some(FuseMode::ShotClock);
        assert_eq!(request.mode(), FuseMode::ShotClock);
    }

    #[test]
    fn test_request_validation() {
        let mut request = RoundSetup::fixed(10_000).request();
        assert!(request.validate().is_ok());
        request.difficulty = 6;
        assert!(matches!(request.validate(), Err(SessionError::InvalidInput(_))));
        request.difficulty = 3;
        request.fuse_duration_ms = 61_000;
        assert!(request.validate().is_err());

        request.fuse_duration_ms = 10_000;
        request.fuse_mode = Some(
            serde_json::from_str(
                r#"{"kind":"accelerating","startMs":9223372036854775807,"stepMs":2000,"floorMs":5000}"#,
            )
            .unwrap(),
        );
        assert!(matches!(request.validate(), Err(SessionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_prepare_fills_pool_and_reports_progress() {
        let harness = Harness::new();
        let host = harness.with_controller(&["p1", "p2"]).await;

        let outcome = host.prepare_game(RoundSetup::fixed(10_000).request()).await.unwrap();
        assert_eq!(outcome, PrepareOutcome::Ready(20));
        assert_eq!(host.pool_len(), 20);

        let session = harness.store.snapshot().await;
        assert_eq!(session.question_generation_status, GenerationStatus::Ready);
        assert_eq!(
            session.question_generation_progress,
            GenerationProgress {
                current: 20,
                total: 20
            }
        );
        assert_eq!(session.prepared_question_count, 20);
        assert!(session.pending_game_settings.is_some());
        // The pool itself never enters the document
        assert!(session.current_question.is_none());
    }

    #[tokio::test]
    async fn test_prepare_requires_two_players() {
        let harness = Harness::new();
        let host = harness.with_controller(&["p1"]).await;
        let err = host
            .prepare_game(RoundSetup::fixed(10_000).request())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(
            harness.store.snapshot().await.question_generation_status,
            GenerationStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_cancel_preparation_is_idempotent() {
        let harness = Harness::new();
        let host = harness.with_controller(&["p1", "p2"]).await;
        host.prepare_game(RoundSetup::fixed(10_000).request()).await.unwrap();

        for _ in 0..2 {
            host.cancel_preparation().await.unwrap();
            let session = harness.store.snapshot().await;
            assert_eq!(session.question_generation_status, GenerationStatus::Idle);
            assert_eq!(session.prepared_question_count, 0);
            assert_eq!(host.pool_len(), 0);
        }
    }

    #[tokio::test]
    async fn test_controller_drops_pool_after_backup_cancels() {
        let harness = Harness::new();
        let host = harness.with_controller(&["p1", "p2"]).await;
        host.prepare_game(RoundSetup::fixed(10_000).request()).await.unwrap();

        harness.peer("h2", Role::Host).cancel_preparation().await.unwrap();
        assert_eq!(host.pool_len(), 20);

        host.tick().await.unwrap();
        assert_eq!(host.pool_len(), 0);
        assert!(matches!(host.start_game().await, Err(SessionError::NotReady)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_preparation() {
        use crate::llm::{GenerateRequest, GenerateResponse, LlmManager, LlmProvider, LlmResult};
        use crate::questions::{FallbackBank, QuestionGenerator};
        use async_trait::async_trait;

        struct Hanging;

        #[async_trait]
        impl LlmProvider for Hanging {
            async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
                std::future::pending().await
            }

            fn name(&self) -> &str {
                "hanging"
            }
        }

        let mut harness = Harness::new();
        harness.generator = Arc::new(QuestionGenerator::new(
            Some(LlmManager::new(vec![Box::new(Hanging)])),
            FallbackBank::default(),
            &harness.config,
        ));
        let host = Arc::new(harness.with_controller(&["p1", "p2"]).await);

        let preparing = {
            let host = host.clone();
            tokio::spawn(async move { host.prepare_game(RoundSetup::fixed(10_000).request()).await })
        };
        // Wait until the document shows the preparation
        for _ in 0..100 {
            if harness.store.snapshot().await.question_generation_status
                == GenerationStatus::Preparing
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        host.cancel_preparation().await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), preparing)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PrepareOutcome::Cancelled);

        let session = harness.store.snapshot().await;
        assert_eq!(session.question_generation_status, GenerationStatus::Idle);
        assert_eq!(host.pool_len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_leaves_running_game_alone() {
        let harness = Harness::new();
        let host = harness.running_game(&["p1", "p2"], RoundSetup::fixed(10_000)).await;
        let before = harness.store.snapshot().await;

        host.cancel_preparation().await.unwrap();
        let after = harness.store.snapshot().await;
        assert_eq!(before, after);
        assert!(host.pool_len() > 0);
    }
}
