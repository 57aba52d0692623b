use std::collections::HashMap;

use assess_core::model::{Answer, AnswerValue, ItemId, Progress, Session};

use crate::error::ValidationError;

/// Derives progress from a session and its stored answers on every call.
pub struct ProgressTracker;

impl ProgressTracker {
    #[must_use]
    pub fn compute(session: &Session, answers: &[Answer]) -> Progress {
        Progress::compute(session, &answer_map(answers))
    }

    /// Fold a client-reported position into `progress`.
    ///
    /// The hint only raises `last_index`; it never lowers it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::PositionOutOfRange` unless `1 <= hint <= total`.
    pub fn with_position_hint(
        mut progress: Progress,
        hint: Option<u32>,
    ) -> Result<Progress, ValidationError> {
        let Some(index) = hint else {
            return Ok(progress);
        };
        let in_range = index >= 1 && usize::try_from(index).is_ok_and(|i| i <= progress.total);
        if !in_range {
            return Err(ValidationError::PositionOutOfRange {
                index,
                total: progress.total,
            });
        }
        progress.last_index = progress.last_index.max(index);
        Ok(progress)
    }
}

/// Latest value per item.
#[must_use]
pub fn answer_map(answers: &[Answer]) -> HashMap<ItemId, AnswerValue> {
    answers
        .iter()
        .map(|a| (a.item_id, a.value.clone()))
        .collect()
}
