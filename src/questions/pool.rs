use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{PlayerId, Question, QuestionId};

/// Served question texts remembered across rounds
const SERVED_HISTORY: usize = 200;

/// Controller-local cache of the questions prepared for a round.
///
/// Only its size is ever replicated; the questions themselves stay here.
#[derive(Debug, Default, Clone)]
pub struct PreparedPool {
    questions: Vec<Question>,
    seen: HashMap<PlayerId, HashSet<QuestionId>>,
    served: VecDeque<String>,
}

impl PreparedPool {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Drop the prepared questions. The served history survives so later
    /// rounds can steer away from questions already played.
    pub fn clear(&mut self) {
        self.questions.clear();
        self.seen.clear();
    }

    pub fn extend(&mut self, questions: impl IntoIterator<Item = Question>) {
        self.questions.extend(questions);
    }

    /// Texts to keep out of new batches: served history first, then the pool
    pub fn avoid_texts(&self) -> Vec<String> {
        self.served
            .iter()
            .cloned()
            .chain(self.questions.iter().map(|q| q.text.clone()))
            .collect()
    }

    /// Forget who has seen what, keeping the questions (new round, same pool)
    pub fn reset_seen(&mut self) {
        self.seen.clear();
    }

    /// Pick a random question `player_id` has not seen this round.
    ///
    /// `exclude` (usually the question currently on screen) is never returned
    /// unless it is the only question in the pool. Once the player has seen
    /// everything their seen-set is reset and the full pool is eligible again.
    pub fn select_for_player<R: Rng>(
        &mut self,
        player_id: &str,
        exclude: Option<&str>,
        rng: &mut R,
    ) -> Option<Question> {
        if self.questions.is_empty() {
            return None;
        }

        let seen = self.seen.entry(player_id.to_string()).or_default();
        let mut candidates: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| !seen.contains(&q.id) && Some(q.id.as_str()) != exclude)
            .collect();

        if candidates.is_empty() {
            tracing::debug!("Player {} exhausted the question pool, resetting", player_id);
            seen.clear();
            candidates = self
                .questions
                .iter()
                .filter(|q| Some(q.id.as_str()) != exclude)
                .collect();
        }
        if candidates.is_empty() {
            candidates = self.questions.iter().collect();
        }

        let picked = (*candidates.choose(rng)?).clone();
        seen.insert(picked.id.clone());

        if self.served.len() >= SERVED_HISTORY {
            self.served.pop_front();
        }
        self.served.push_back(picked.text.clone());
        Some(picked)
    }
}

/// Pool handle shared between the peer and its transaction bodies
#[derive(Debug, Default, Clone)]
pub struct SharedPool(Arc<Mutex<PreparedPool>>);

impl SharedPool {
    pub fn lock(&self) -> MutexGuard<'_, PreparedPool> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Question {}?", id),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: "a".to_string(),
        }
    }

    fn pool_of(n: usize) -> PreparedPool {
        let mut pool = PreparedPool::default();
        pool.extend((0..n).map(|i| question(&i.to_string())));
        pool
    }

    #[test]
    fn test_no_repeats_until_exhausted() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pool = pool_of(5);
        let mut picked = HashSet::new();
        for _ in 0..5 {
            let q = pool.select_for_player("p1", None, &mut rng).unwrap();
            assert!(picked.insert(q.id));
        }
        // Pool exhausted: the next pick starts over
        assert!(pool.select_for_player("p1", None, &mut rng).is_some());
    }

    #[test]
    fn test_seen_sets_are_per_player() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = pool_of(1);
        assert_eq!(pool.select_for_player("p1", None, &mut rng).unwrap().id, "0");
        assert_eq!(pool.select_for_player("p2", None, &mut rng).unwrap().id, "0");
    }

    #[test]
    fn test_excluded_question_is_skipped() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut pool = pool_of(2);
        for _ in 0..10 {
            let q = pool.select_for_player("p1", Some("0"), &mut rng).unwrap();
            assert_eq!(q.id, "1");
        }
        // A single-question pool still serves its only question
        let mut single = pool_of(1);
        assert_eq!(single.select_for_player("p1", Some("0"), &mut rng).unwrap().id, "0");
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(PreparedPool::default()
            .select_for_player("p1", None, &mut rng)
            .is_none());
    }

    #[test]
    fn test_served_history_survives_clear() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut pool = pool_of(3);
        let served = pool.select_for_player("p1", None, &mut rng).unwrap();
        assert_eq!(pool.avoid_texts().len(), 4);

        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.avoid_texts(), vec![served.text]);
    }

    #[test]
    fn test_shared_pool_clear() {
        let shared = SharedPool::default();
        shared.lock().extend(vec![question("x")]);
        assert_eq!(shared.clone().lock().len(), 1);
        shared.lock().clear();
        assert!(shared.lock().is_empty());
    }
}
