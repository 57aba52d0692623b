use serde::{Deserialize, Serialize};

use crate::model::answer::{AnswerError, AnswerValue};
use crate::model::ids::{ItemId, OptionId, QuestionId, TopicId};
use crate::model::question::{AnswerKey, Choice, Difficulty, Question, QuestionKind};

/// Immutable snapshot of one question as presented within a session.
///
/// Captured at session start; later edits to the bank never reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub order_no: u32,
    pub question_id: QuestionId,
    pub topic_ids: Vec<TopicId>,
    pub stem: String,
    pub choices: Vec<Choice>,
    pub key: AnswerKey,
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
}

impl Item {
    /// Snapshot `question` at position `order_no` (1-based).
    #[must_use]
    pub fn snapshot(id: ItemId, order_no: u32, question: &Question) -> Self {
        Self {
            id,
            order_no,
            question_id: question.id(),
            topic_ids: question.topic_ids().to_vec(),
            stem: question.stem().to_owned(),
            choices: question.choices().to_vec(),
            key: question.key().clone(),
            explanation: question.explanation().map(ToOwned::to_owned),
            difficulty: question.difficulty(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.key.kind()
    }

    #[must_use]
    pub fn has_option(&self, option: &OptionId) -> bool {
        self.choices.iter().any(|c| &c.id == option)
    }

    /// Check that `value` is an acceptable answer shape for this item.
    ///
    /// Multi-select answers may carry unknown option ids; they are kept and
    /// count against the learner when graded.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::KindMismatch` if the value was parsed for another
    /// question kind, or `AnswerError::UnknownOption` for a single-choice answer
    /// naming an option the item does not offer.
    pub fn validate_answer(&self, value: &AnswerValue) -> Result<(), AnswerError> {
        if value.kind() != self.kind() {
            return Err(AnswerError::KindMismatch {
                expected: self.kind(),
                found: value.kind(),
            });
        }
        if let AnswerValue::Single(option) = value {
            if !option.is_empty() && !self.has_option(option) {
                return Err(AnswerError::UnknownOption(option.clone()));
            }
        }
        Ok(())
    }
}
