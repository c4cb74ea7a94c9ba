use rand::Rng;
use serde::Serialize;

use super::guard::EXPLOSION_TIMEOUT;
use super::lifecycle::clear_game_state;
use super::{SessionError, SessionPeer, SessionResult};
use crate::fuse::{next_fuse, Fuse, FuseTrigger};
use crate::questions::PreparedPool;
use crate::scoring;
use crate::store::transact;
use crate::types::*;

/// What one fuse expiry did to the round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplosionOutcome {
    Eliminated {
        player_id: PlayerId,
        next_holder: Option<PlayerId>,
    },
    GameOver {
        player_id: PlayerId,
        winner_id: Option<PlayerId>,
    },
}

fn current_fuse(session: &Session) -> Fuse {
    Fuse {
        duration_ms: session.fuse_duration,
        explodes_at: session.bomb_explosion_time,
    }
}

/// Move the bomb after a correct answer by the current holder.
///
/// Returns the new holder, or None if nobody else is alive.
pub(crate) fn apply_pass<R: Rng>(
    session: &mut Session,
    pool: &mut PreparedPool,
    now: i64,
    rng: &mut R,
) -> Option<PlayerId> {
    let outgoing = session.bomb_holder_id.clone()?;
    let next = scoring::fair_select(session, Some(&outgoing), rng)?;

    scoring::record_pass(session, &outgoing, now);
    scoring::assign_holder(session, &next, now);

    let current_id = session.current_question.as_ref().map(|q| q.id.clone());
    if let Some(question) = pool.select_for_player(&next, current_id.as_deref(), rng) {
        session.current_question = Some(question);
    }

    let fuse = next_fuse(
        &session.fuse_mode,
        FuseTrigger::Pass,
        current_fuse(session),
        now,
        rng,
    );
    session.fuse_duration = fuse.duration_ms;
    session.bomb_explosion_time = fuse.explodes_at;
    Some(next)
}

/// Eliminate the holder whose fuse ran out at `deadline`, then either re-arm
/// for the next holder or end the game.
fn explode<R: Rng>(
    session: &mut Session,
    pool: &mut PreparedPool,
    deadline: i64,
    now: i64,
    rng: &mut R,
) -> Option<ExplosionOutcome> {
    // Another tick already handled this deadline
    if !session.is_active() || session.bomb_explosion_time != Some(deadline) {
        return None;
    }
    let victim = session.bomb_holder_id.clone()?;
    if !session.is_alive(&victim) {
        return None;
    }

    scoring::eliminate(session, &victim, now, rng);
    session.pending_answer = None;

    let alive = session.alive_players();
    if alive.len() <= 1 {
        let winner = alive.into_iter().next();
        if let Some(winner) = &winner {
            scoring::declare_winner(session, winner, now, rng);
        }
        clear_game_state(session);
        return Some(ExplosionOutcome::GameOver {
            player_id: victim,
            winner_id: winner,
        });
    }

    let next = scoring::fair_select(session, None, rng);
    match &next {
        Some(holder) => {
            scoring::assign_holder(session, holder, now);
            let current_id = session.current_question.as_ref().map(|q| q.id.clone());
            if let Some(question) = pool.select_for_player(holder, current_id.as_deref(), rng) {
                session.current_question = Some(question);
            }
            let fuse = next_fuse(
                &session.fuse_mode,
                FuseTrigger::Explosion,
                current_fuse(session),
                now,
                rng,
            );
            session.fuse_duration = fuse.duration_ms;
            session.bomb_explosion_time = fuse.explodes_at;
        }
        None => {
            session.bomb_holder_id = None;
            session.bomb_explosion_time = None;
        }
    }

    Some(ExplosionOutcome::Eliminated {
        player_id: victim,
        next_holder: next,
    })
}

impl SessionPeer {
    /// Handle an expired fuse.
    ///
    /// Guarded against re-entry on this peer and raced against a hard timeout.
    /// Returns None when nothing was due, the guard was busy, or another tick
    /// already handled the same deadline.
    pub(crate) async fn handle_explosion(&self) -> SessionResult<Option<ExplosionOutcome>> {
        let session = self.require_controller("handle explosions").await?;
        self.refill_pool_if_empty(&session).await;
        let now = self.now();
        let Some(deadline) = session
            .bomb_explosion_time
            .filter(|deadline| session.is_active() && now >= *deadline)
        else {
            return Ok(None);
        };

        let Some(_permit) = self.explosion_guard.try_acquire(now) else {
            tracing::debug!("Explosion handling already in progress");
            return Ok(None);
        };

        let pool = self.pool.clone();
        let outcome = tokio::time::timeout(
            EXPLOSION_TIMEOUT,
            transact(self.store.as_ref(), move |s| {
                explode(s, &mut pool.lock(), deadline, now, &mut rand::rng())
            }),
        )
        .await
        .map_err(|_| {
            tracing::error!("Explosion handling timed out after {:?}", EXPLOSION_TIMEOUT);
            SessionError::Timeout(EXPLOSION_TIMEOUT)
        })??;

        match &outcome {
            Some(ExplosionOutcome::GameOver {
                player_id,
                winner_id,
            }) => {
                self.pool.lock().clear();
                tracing::info!(
                    "{} exploded, game over, winner: {}",
                    player_id,
                    winner_id.as_deref().unwrap_or("none")
                );
            }
            Some(ExplosionOutcome::Eliminated {
                player_id,
                next_holder,
            }) => {
                tracing::info!(
                    "{} exploded, bomb goes to {}",
                    player_id,
                    next_holder.as_deref().unwrap_or("nobody")
                );
            }
            None => {}
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::fuse::FuseMode;
    use crate::store::SessionStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    fn active_session(players: &[&str], mode: FuseMode) -> Session {
        let mut session = Session::default();
        for id in players {
            session.players.insert(
                id.to_string(),
                Player {
                    name: id.to_string(),
                    photo_url: None,
                },
            );
        }
        let ids: Vec<PlayerId> = players.iter().map(|s| s.to_string()).collect();
        scoring::reset_round(&mut session, &ids);
        session.started = true;
        session.fuse_duration = mode.base_duration_ms();
        session.fuse_mode = mode;
        scoring::assign_holder(&mut session, players[0], 0);
        session.bomb_explosion_time = Some(session.fuse_duration as i64);
        session
    }

    fn pool_with(n: usize) -> PreparedPool {
        let mut pool = PreparedPool::default();
        pool.extend((0..n).map(|i| Question {
            id: format!("q{}", i),
            text: format!("Question {}?", i),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: "a".into(),
        }));
        pool
    }

    #[test]
    fn test_shot_clock_pass_always_rearms_full_window() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = pool_with(10);
        let mut session = active_session(&["a", "b", "c"], FuseMode::ShotClock);

        for now in [1_000, 9_000, 14_999] {
            let from = session.bomb_holder_id.clone().unwrap();
            let to = apply_pass(&mut session, &mut pool, now, &mut rng).unwrap();
            assert_ne!(from, to);
            assert_eq!(session.fuse_duration, 15_000);
            assert_eq!(session.bomb_explosion_time, Some(now + 15_000));
        }
    }

    #[test]
    fn test_hot_potato_pass_keeps_deadline() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut pool = pool_with(5);
        let mut session = active_session(
            &["a", "b"],
            FuseMode::HotPotato {
                duration_ms: 20_000,
            },
        );
        apply_pass(&mut session, &mut pool, 18_000, &mut rng).unwrap();
        assert_eq!(session.bomb_holder_id.as_deref(), Some("b"));
        assert_eq!(session.bomb_explosion_time, Some(20_000));
        // Passed with two seconds left
        assert_eq!(session.player_stats["a"].close_calls, 1);
        assert_eq!(session.player_stats["b"].bomb_receives, 1);
    }

    #[test]
    fn test_explode_handles_each_deadline_once() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut pool = pool_with(5);
        let mut session = active_session(
            &["a", "b", "c"],
            FuseMode::Fixed {
                duration_ms: 10_000,
            },
        );

        let first = explode(&mut session, &mut pool, 10_000, 10_000, &mut rng);
        assert!(matches!(first, Some(ExplosionOutcome::Eliminated { ref player_id, .. }) if player_id == "a"));
        assert_eq!(session.bomb_explosion_time, Some(20_000));

        // Same deadline again: nothing happens
        assert!(explode(&mut session, &mut pool, 10_000, 10_050, &mut rng).is_none());
        assert_eq!(session.eliminated_count(), 1);
        assert_eq!(
            session.alive_players().len() + session.eliminated_count(),
            session.participant_count()
        );
    }

    #[test]
    fn test_last_explosion_ends_game() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = pool_with(5);
        let mut session = active_session(
            &["a", "b"],
            FuseMode::Fixed {
                duration_ms: 10_000,
            },
        );

        let outcome = explode(&mut session, &mut pool, 10_000, 10_000, &mut rng).unwrap();
        assert_eq!(
            outcome,
            ExplosionOutcome::GameOver {
                player_id: "a".to_string(),
                winner_id: Some("b".to_string()),
            }
        );
        assert!(!session.started);
        assert!(session.bomb_holder_id.is_none());
        assert!(session.bomb_explosion_time.is_none());
        assert_eq!(session.winner_id.as_deref(), Some("b"));
        assert_eq!(session.elimination_order.values().last().map(String::as_str), Some("b"));
        assert_eq!(session.phase(), SessionPhase::GameOver);
    }

    #[tokio::test]
    async fn test_concurrent_ticks_eliminate_once() {
        let harness = Harness::new();
        let host = Arc::new(
            harness
                .running_game(&["p1", "p2", "p3"], RoundSetup::fixed(10_000))
                .await,
        );
        harness.clock.advance(Duration::from_millis(10_000));

        let ticks: Vec<_> = (0..8)
            .map(|_| {
                let host = host.clone();
                tokio::spawn(async move { host.tick().await })
            })
            .collect();
        for tick in futures::future::join_all(ticks).await {
            tick.unwrap().unwrap();
        }

        let session = harness.store.snapshot().await;
        assert_eq!(session.eliminated_count(), 1);
        assert_eq!(session.elimination_order.len(), 1);
        assert!(session.bomb_explosion_time.unwrap() > harness.store.server_timestamp());
        assert!(!host.explosion_guard.is_held());
    }

    #[tokio::test]
    async fn test_explosion_before_deadline_is_ignored() {
        let harness = Harness::new();
        let host = harness
            .running_game(&["p1", "p2"], RoundSetup::fixed(10_000))
            .await;
        harness.clock.advance(Duration::from_millis(9_999));
        assert!(host.handle_explosion().await.unwrap().is_none());

        harness.clock.advance(Duration::from_millis(1));
        let outcome = host.handle_explosion().await.unwrap();
        assert!(matches!(outcome, Some(ExplosionOutcome::GameOver { .. })));
        assert_eq!(host.pool_len(), 0);
        assert_eq!(harness.store.snapshot().await.phase(), SessionPhase::GameOver);
    }
}
