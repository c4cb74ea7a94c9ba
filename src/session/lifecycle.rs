use super::{SessionError, SessionPeer, SessionResult};
use crate::config::MIN_PLAYERS;
use crate::fuse::{next_fuse, Fuse, FuseTrigger};
use crate::scoring;
use crate::store::transact;
use crate::types::*;

/// Reset everything a finished or stopped game leaves behind in the document
pub(crate) fn clear_game_state(session: &mut Session) {
    session.started = false;
    session.countdown_end_time = None;
    session.bomb_holder_id = None;
    session.bomb_explosion_time = None;
    session.current_question = None;
    session.pending_answer = None;
    session.question_generation_status = GenerationStatus::Idle;
    session.question_generation_progress = GenerationProgress::default();
    session.prepared_question_count = 0;
    session.pending_game_settings = None;
}

impl SessionPeer {
    /// Start the countdown for a prepared game
    pub async fn start_game(&self) -> SessionResult<()> {
        let session = self.require_controller("start the game").await?;
        if session.started {
            return Err(SessionError::InvalidState(
                "Game is already running".to_string(),
            ));
        }
        if session.question_generation_status != GenerationStatus::Ready || self.pool_len() == 0 {
            return Err(SessionError::NotReady);
        }
        if session.players.len() < MIN_PLAYERS {
            return Err(SessionError::InvalidState(format!(
                "At least {} players are needed",
                MIN_PLAYERS
            )));
        }

        self.pool.lock().reset_seen();
        let countdown_end = self.now() + self.config.countdown.as_millis() as i64;
        let started = transact(self.store.as_ref(), move |s| {
            if s.started || s.question_generation_status != GenerationStatus::Ready {
                return false;
            }
            if let Some(pending) = s.pending_game_settings.clone() {
                s.game_settings = pending.settings;
                s.fuse_duration = pending.fuse_mode.base_duration_ms();
                s.reset_on_pass = pending.fuse_mode.resets_on_pass();
                s.fuse_mode = pending.fuse_mode;
            }
            s.started = true;
            s.countdown_end_time = Some(countdown_end);
            s.winner_id = None;
            s.bomb_holder_id = None;
            s.bomb_explosion_time = None;
            s.current_question = None;
            s.pending_answer = None;
            true
        })
        .await?;

        if !started {
            return Err(SessionError::NotReady);
        }
        tracing::info!("Game starting, countdown ends at {}", countdown_end);
        Ok(())
    }

    /// Leave the countdown: reset the round, hand out the bomb and arm the fuse.
    /// Returns the first holder, or None if the countdown was not due.
    pub(crate) async fn begin_round(&self) -> SessionResult<Option<PlayerId>> {
        self.refill_pool_if_empty(&self.store.snapshot().await).await;
        let now = self.now();
        let pool = self.pool.clone();

        let holder = transact(self.store.as_ref(), move |s| {
            let due = s.started && s.countdown_end_time.is_some_and(|end| now >= end);
            if !due {
                return None;
            }
            let mut rng = rand::rng();
            let participants: Vec<PlayerId> = s.players.keys().cloned().collect();
            scoring::reset_round(s, &participants);

            let Some(holder) = scoring::fair_select(s, None, &mut rng) else {
                clear_game_state(s);
                return None;
            };
            scoring::assign_holder(s, &holder, now);
            s.current_question = pool.lock().select_for_player(&holder, None, &mut rng);

            let fuse = next_fuse(
                &s.fuse_mode,
                FuseTrigger::RoundStart,
                Fuse {
                    duration_ms: s.fuse_duration,
                    explodes_at: None,
                },
                now,
                &mut rng,
            );
            s.fuse_duration = fuse.duration_ms;
            s.bomb_explosion_time = fuse.explodes_at;
            s.countdown_end_time = None;
            s.pending_answer = None;
            Some(holder)
        })
        .await?;

        if let Some(holder) = &holder {
            tracing::info!("Round started, {} holds the bomb", holder);
        }
        Ok(holder)
    }

    /// Force the session back to idle and discard the local pool.
    /// Any host may stop the game; a finished game's winner is dismissed too.
    /// The controller drops its own pool on its next tick when someone else
    /// stopped the game.
    pub async fn stop_game(&self) -> SessionResult<()> {
        self.require_host("stop the game")?;
        self.abort_preparation();

        transact(self.store.as_ref(), |s| {
            clear_game_state(s);
            s.winner_id = None;
        })
        .await?;

        self.pool.lock().clear();
        tracing::info!("Game stopped by {}", self.id);
        Ok(())
    }
}
