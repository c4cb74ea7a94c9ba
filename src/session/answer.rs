use serde::Serialize;

use super::bomb::apply_pass;
use super::{SessionPeer, SessionResult};
use crate::questions::answers_match;
use crate::store::transact;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Written to the document, waiting for the controller
    Pending,
    /// Dropped locally; the holder keeps whatever question is current
    Rejected(&'static str),
}

/// Controller verdict on a pending answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Arbitration {
    Correct {
        from: PlayerId,
        to: Option<PlayerId>,
    },
    Wrong {
        player_id: PlayerId,
    },
    /// Holder or question changed since the answer was submitted
    Stale,
    /// The fuse ran out before the answer was arbitrated
    Expired,
}

fn check_submission(session: &Session, submitter: &str, question_id: &str) -> Option<&'static str> {
    if !session.is_active() {
        return Some("not_active");
    }
    if session.bomb_holder_id.as_deref() != Some(submitter) {
        return Some("not_holder");
    }
    if session.current_question.as_ref().map(|q| q.id.as_str()) != Some(question_id) {
        return Some("question_changed");
    }
    if session.pending_answer.is_some() {
        return Some("already_pending");
    }
    None
}

impl SessionPeer {
    /// Submit an answer for the question currently on screen.
    ///
    /// Only the bomb holder's submission for the current question is recorded;
    /// anything else is rejected without an error.
    pub async fn submit_answer(&self, question_id: &str, answer: &str) -> SessionResult<SubmitOutcome> {
        let session = self.store.snapshot().await;
        if let Some(reason) = check_submission(&session, &self.id, question_id) {
            tracing::debug!("Answer from {} rejected: {}", self.id, reason);
            return Ok(SubmitOutcome::Rejected(reason));
        }

        let pending = PendingAnswer {
            submitter_id: self.id.clone(),
            question_id: question_id.to_string(),
            answer: answer.to_string(),
            submitted_at: self.now(),
        };
        let outcome = transact(self.store.as_ref(), move |s| {
            match check_submission(s, &pending.submitter_id, &pending.question_id) {
                Some(reason) => SubmitOutcome::Rejected(reason),
                None => {
                    s.pending_answer = Some(pending.clone());
                    SubmitOutcome::Pending
                }
            }
        })
        .await?;

        Ok(outcome)
    }

    /// Arbitrate the pending answer, if any. Controller only; the pending
    /// record is cleared whatever the verdict.
    pub(crate) async fn handle_pending_answer(&self) -> SessionResult<Option<Arbitration>> {
        let session = self.require_controller("arbitrate answers").await?;
        if session.pending_answer.is_none() {
            return Ok(None);
        }
        self.refill_pool_if_empty(&session).await;

        let now = self.now();
        let pool = self.pool.clone();
        let verdict = transact(self.store.as_ref(), move |s| {
            let pending = s.pending_answer.take()?;

            let current = s.current_question.clone();
            let stale = !s.is_active()
                || s.bomb_holder_id.as_deref() != Some(pending.submitter_id.as_str())
                || current.as_ref().map(|q| q.id.as_str()) != Some(pending.question_id.as_str());
            let question = match current {
                Some(question) if !stale => question,
                _ => return Some(Arbitration::Stale),
            };
            if s.bomb_explosion_time.is_some_and(|deadline| now >= deadline) {
                return Some(Arbitration::Expired);
            }

            let mut rng = rand::rng();
            let mut pool = pool.lock();
            if answers_match(&pending.answer, &question.correct_answer) {
                let to = apply_pass(s, &mut pool, now, &mut rng);
                return Some(Arbitration::Correct {
                    from: pending.submitter_id,
                    to,
                });
            }

            if let Some(next) =
                pool.select_for_player(&pending.submitter_id, Some(&question.id), &mut rng)
            {
                s.current_question = Some(next);
            }
            Some(Arbitration::Wrong {
                player_id: pending.submitter_id,
            })
        })
        .await?;

        match &verdict {
            Some(Arbitration::Correct { from, to }) => tracing::info!(
                "{} answered correctly, bomb passed to {}",
                from,
                to.as_deref().unwrap_or("nobody")
            ),
            Some(Arbitration::Wrong { player_id }) => {
                tracing::debug!("{} answered wrong, serving a new question", player_id)
            }
            Some(other) => tracing::debug!("Pending answer discarded: {:?}", other),
            None => {}
        }
        Ok(verdict)
    }
}
