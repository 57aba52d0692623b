use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::answer::AnswerValue;
use crate::model::ids::ItemId;
use crate::model::session::Session;

/// Answered/total counts and the furthest answered position of a session.
///
/// Always derived from the session and its answers; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub answered: usize,
    /// Highest answered `order_no`, or 0 when nothing is answered.
    pub last_index: u32,
}

impl Progress {
    /// Progress of a session nobody has touched yet.
    #[must_use]
    pub fn fresh(total: usize) -> Self {
        Self {
            total,
            answered: 0,
            last_index: 0,
        }
    }

    /// Count non-empty answers that belong to items of `session`.
    #[must_use]
    pub fn compute(session: &Session, answers: &HashMap<ItemId, AnswerValue>) -> Self {
        let mut answered = 0;
        let mut last_index = 0;
        for item in session.items() {
            let has_answer = answers.get(&item.id).is_some_and(|value| !value.is_empty());
            if has_answer {
                answered += 1;
                last_index = last_index.max(item.order_no);
            }
        }
        Self {
            total: session.item_count(),
            answered,
            last_index,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answered == self.total
    }
}
