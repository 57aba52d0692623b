use std::collections::HashMap;
use std::sync::Arc;

use assess_core::model::{Answer, AnswerValue, ItemId, OwnerId, Progress, SessionId};
use storage::repository::{AnswerRepository, SessionRepository, StorageError};

use crate::Clock;
use crate::error::{AssessmentError, Missing};

use super::locks::SessionLocks;
use super::progress::{ProgressTracker, answer_map};
use super::view::SaveOutcome;
use super::{ensure_in_progress, load_owned, terminal_error};

/// Saves answers of in-progress sessions.
///
/// Saves share the session's read lock, so answers to different items of one
/// session proceed concurrently while a submit or discard waits for them.
#[derive(Clone)]
pub struct AnswerStore {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerRepository>,
    locks: Arc<SessionLocks>,
}

impl AnswerStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        answers: Arc<dyn AnswerRepository>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            clock,
            sessions,
            answers,
            locks,
        }
    }

    /// Upsert the answer for one item and return fresh progress.
    ///
    /// `raw` is the wire form: an option id, comma-joined option ids, or free
    /// text. Multi-choice values are stored as a sorted set. Saving the same
    /// value again only moves `saved_at`.
    ///
    /// # Errors
    ///
    /// - `NotFound(Session)` if the session is unknown or owned by someone else.
    /// - `NotFound(Item)` if `item_id` is not part of the session.
    /// - `SessionAlreadySubmitted` / `SessionDiscarded` for terminal sessions.
    /// - `Validation` for malformed answers or an out-of-range `last_index`.
    pub async fn save(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
        item_id: ItemId,
        raw: &str,
        last_index: Option<u32>,
    ) -> Result<SaveOutcome, AssessmentError> {
        let _guard = self.locks.read(session_id).await;

        let session = load_owned(self.sessions.as_ref(), session_id, owner_id).await?;
        ensure_in_progress(&session)?;
        ProgressTracker::with_position_hint(Progress::fresh(session.item_count()), last_index)?;

        let item = session
            .item(item_id)
            .ok_or(AssessmentError::NotFound(Missing::Item))?;
        let value = AnswerValue::parse(item.kind(), raw)?;
        item.validate_answer(&value)?;

        let answer = Answer::new(session_id, item_id, value, self.clock.now());
        match self.answers.save_answer(&answer).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                // Another process moved the session on since we loaded it.
                let current = self.sessions.get_session(session_id).await?;
                return Err(terminal_error(current.state()));
            }
            Err(err) => return Err(err.into()),
        }

        let stored = self.answers.answers_for(session_id).await?;
        let progress = ProgressTracker::with_position_hint(
            ProgressTracker::compute(&session, &stored),
            last_index,
        )?;

        tracing::debug!(
            %session_id,
            %item_id,
            answered = progress.answered,
            total = progress.total,
            "answer saved"
        );

        Ok(SaveOutcome {
            item_id,
            value: answer.value.to_wire(),
            progress,
        })
    }

    /// Every stored answer of a session, keyed by item.
    ///
    /// # Errors
    ///
    /// Returns `NotFound(Session)` if the session is unknown or owned by someone else.
    pub async fn get(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
    ) -> Result<HashMap<ItemId, AnswerValue>, AssessmentError> {
        load_owned(self.sessions.as_ref(), session_id, owner_id).await?;
        let stored = self.answers.answers_for(session_id).await?;
        Ok(answer_map(&stored))
    }
}
