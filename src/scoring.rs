//! Elimination and scoring bookkeeping on the session document.
//!
//! All functions here mutate a `Session` in place and are meant to be called
//! from inside a store transaction.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// A pass with less than this much fuse left counts as a close call
pub const CLOSE_CALL_MS: i64 = 5_000;

/// Safe character set for key suffixes (excludes 0/O, 1/I/L to avoid confusion)
const SUFFIX_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const SUFFIX_LENGTH: usize = 6;

/// Pick the next bomb holder.
///
/// Among alive participants (minus `exclude`) prefer those who received the bomb
/// the fewest times; ties are broken uniformly at random.
pub fn fair_select<R: Rng>(
    session: &Session,
    exclude: Option<&str>,
    rng: &mut R,
) -> Option<PlayerId> {
    let candidates: Vec<(PlayerId, u32)> = session
        .alive_players()
        .into_iter()
        .filter(|id| Some(id.as_str()) != exclude)
        .map(|id| {
            let receives = session
                .player_stats
                .get(&id)
                .map(|s| s.bomb_receives)
                .unwrap_or(0);
            (id, receives)
        })
        .collect();

    let fewest = candidates.iter().map(|(_, r)| *r).min()?;
    let least_targeted: Vec<&PlayerId> = candidates
        .iter()
        .filter(|(_, r)| *r == fewest)
        .map(|(id, _)| id)
        .collect();

    least_targeted.choose(rng).map(|id| (*id).clone())
}

/// Start a fresh round: every participant alive with zeroed stats
pub fn reset_round(session: &mut Session, participants: &[PlayerId]) {
    session.player_status.clear();
    session.player_stats.clear();
    session.elimination_order.clear();
    session.winner_id = None;

    for id in participants {
        session.player_status.insert(id.clone(), PlayerStatus::Alive);
        session.player_stats.insert(id.clone(), PlayerStats::default());
    }
}

/// Hand the bomb to `player_id` and start their hold clock
pub fn assign_holder(session: &mut Session, player_id: &str, now: i64) {
    session.bomb_holder_id = Some(player_id.to_string());
    let stats = session.player_stats.entry(player_id.to_string()).or_default();
    stats.bomb_receives += 1;
    stats.bomb_hold_start = Some(now);
}

/// Stop the hold clock for `player_id`, adding the elapsed time
pub fn finalize_hold(session: &mut Session, player_id: &str, now: i64) {
    if let Some(stats) = session.player_stats.get_mut(player_id) {
        if let Some(start) = stats.bomb_hold_start.take() {
            stats.bomb_hold_time += (now - start).max(0) as u64;
        }
    }
}

/// Book a successful pass for the outgoing holder
pub fn record_pass(session: &mut Session, player_id: &str, now: i64) {
    let close_call = session
        .bomb_explosion_time
        .is_some_and(|explodes_at| explodes_at - now < CLOSE_CALL_MS);

    finalize_hold(session, player_id, now);
    if let Some(stats) = session.player_stats.get_mut(player_id) {
        stats.questions_answered += 1;
        stats.passes += 1;
        if close_call {
            stats.close_calls += 1;
        }
    }
}

/// Build an elimination key that sorts after every existing key.
///
/// Keys are `<millis>-<sequence>-<random suffix>`; the timestamp never moves
/// backwards relative to the last recorded key.
pub fn elimination_key<R: Rng>(session: &Session, now: i64, rng: &mut R) -> EliminationKey {
    let last_ts = session
        .elimination_order
        .keys()
        .next_back()
        .and_then(|k| k.split('-').next())
        .and_then(|ts| ts.parse::<i64>().ok())
        .unwrap_or(0);
    let ts = now.max(last_ts);
    let suffix: String = (0..SUFFIX_LENGTH)
        .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
        .collect();
    format!("{:013}-{:04}-{}", ts, session.elimination_order.len(), suffix)
}

/// Mark `player_id` eliminated and append them to the elimination order
pub fn eliminate<R: Rng>(session: &mut Session, player_id: &str, now: i64, rng: &mut R) {
    session
        .player_status
        .insert(player_id.to_string(), PlayerStatus::Eliminated);
    let key = elimination_key(session, now, rng);
    session.elimination_order.insert(key, player_id.to_string());
    finalize_hold(session, player_id, now);
}

/// Record the last player standing as the final elimination entry
pub fn declare_winner<R: Rng>(session: &mut Session, winner_id: &str, now: i64, rng: &mut R) {
    finalize_hold(session, winner_id, now);
    let key = elimination_key(session, now, rng);
    session.elimination_order.insert(key, winner_id.to_string());
    session.winner_id = Some(winner_id.to_string());
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub player_id: PlayerId,
    pub display_name: String,
    pub questions_answered: u32,
    /// Hold time in seconds, one decimal
    pub hold_time_secs: f64,
    pub close_calls: u32,
}

/// Final standings: reversed elimination order, winner first
pub fn leaderboard(session: &Session) -> Vec<LeaderboardEntry> {
    session
        .elimination_order
        .values()
        .rev()
        .enumerate()
        .map(|(index, player_id)| {
            let stats = session.player_stats.get(player_id).cloned().unwrap_or_default();
            LeaderboardEntry {
                rank: index as u32 + 1,
                player_id: player_id.clone(),
                display_name: session
                    .player_name(player_id)
                    .unwrap_or("Unknown")
                    .to_string(),
                questions_answered: stats.questions_answered,
                hold_time_secs: (stats.bomb_hold_time as f64 / 100.0).round() / 10.0,
                close_calls: stats.close_calls,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn session_with(players: &[&str]) -> Session {
        let mut session = Session::default();
        for id in players {
            session.players.insert(
                id.to_string(),
                Player {
                    name: id.to_uppercase(),
                    photo_url: None,
                },
            );
        }
        let ids: Vec<PlayerId> = players.iter().map(|s| s.to_string()).collect();
        reset_round(&mut session, &ids);
        session
    }

    #[test]
    fn test_fair_select_prefers_fewest_receives() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut session = session_with(&["a", "b", "c"]);
        session.player_stats.get_mut("a").unwrap().bomb_receives = 2;
        session.player_stats.get_mut("b").unwrap().bomb_receives = 1;
        session.player_stats.get_mut("c").unwrap().bomb_receives = 1;

        for _ in 0..50 {
            let picked = fair_select(&session, None, &mut rng).unwrap();
            assert_ne!(picked, "a");
        }
        for _ in 0..50 {
            assert_eq!(fair_select(&session, Some("b"), &mut rng).unwrap(), "c");
        }
    }

    #[test]
    fn test_fair_select_skips_eliminated_and_breaks_ties_randomly() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut session = session_with(&["a", "b", "c", "d"]);
        session
            .player_status
            .insert("d".to_string(), PlayerStatus::Eliminated);

        let mut seen: HashMap<PlayerId, u32> = HashMap::new();
        for _ in 0..300 {
            let picked = fair_select(&session, None, &mut rng).unwrap();
            *seen.entry(picked).or_default() += 1;
        }
        assert!(!seen.contains_key("d"));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_fair_select_bounds_receive_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut session = session_with(&["a", "b", "c", "d", "e"]);
        let mut holder: Option<PlayerId> = None;
        for now in 0..200 {
            let next = fair_select(&session, holder.as_deref(), &mut rng).unwrap();
            assign_holder(&mut session, &next, now);
            holder = Some(next);
        }
        let receives: Vec<u32> = session.player_stats.values().map(|s| s.bomb_receives).collect();
        let spread = receives.iter().max().unwrap() - receives.iter().min().unwrap();
        assert!(spread <= 1, "receives too uneven: {:?}", receives);
    }

    #[test]
    fn test_fair_select_none_when_nobody_eligible() {
        let mut rng = StdRng::seed_from_u64(1);
        let session = session_with(&["solo"]);
        assert!(fair_select(&session, Some("solo"), &mut rng).is_none());
    }

    #[test]
    fn test_record_pass_counts_close_calls() {
        let mut session = session_with(&["a", "b"]);
        assign_holder(&mut session, "a", 1_000);
        session.bomb_explosion_time = Some(10_000);

        record_pass(&mut session, "a", 4_000);
        let stats = &session.player_stats["a"];
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.questions_answered, 1);
        assert_eq!(stats.close_calls, 0);
        assert_eq!(stats.bomb_hold_time, 3_000);
        assert!(stats.bomb_hold_start.is_none());

        assign_holder(&mut session, "a", 6_000);
        record_pass(&mut session, "a", 6_500);
        assert_eq!(session.player_stats["a"].close_calls, 1);
        assert_eq!(session.player_stats["a"].bomb_hold_time, 3_500);
    }

    #[test]
    fn test_elimination_order_and_leaderboard() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut session = session_with(&["a", "b", "c"]);
        assign_holder(&mut session, "b", 0);
        eliminate(&mut session, "b", 2_500, &mut rng);
        assign_holder(&mut session, "a", 2_500);
        eliminate(&mut session, "a", 2_500, &mut rng);
        declare_winner(&mut session, "c", 2_500, &mut rng);

        let order: Vec<&PlayerId> = session.elimination_order.values().collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(session.elimination_order.len(), 3);
        assert_eq!(session.winner_id.as_deref(), Some("c"));

        let board = leaderboard(&session);
        assert_eq!(board[0].player_id, "c");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[2].player_id, "b");
        assert_eq!(board[2].display_name, "B");
        assert_eq!(board[2].hold_time_secs, 2.5);
        assert_eq!(
            session.eliminated_count() + session.alive_players().len(),
            session.participant_count()
        );
    }

    #[test]
    fn test_elimination_key_never_goes_backwards() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut session = session_with(&["a", "b"]);
        eliminate(&mut session, "a", 5_000, &mut rng);
        let later = elimination_key(&session, 1_000, &mut rng);
        let first = session.elimination_order.keys().next().unwrap().clone();
        assert!(later > first);
        assert!(later.starts_with("0000000005000-0001-"));
    }
}
