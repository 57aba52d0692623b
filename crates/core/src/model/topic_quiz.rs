use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{OwnerId, SessionId, TopicId};
use crate::model::result::AssessmentResult;

/// A learner's running record of submitted quizzes on one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicQuizStats {
    pub owner_id: OwnerId,
    pub topic_id: TopicId,
    pub attempt_count: u32,
    pub last_score: u8,
    pub best_score: u8,
    /// Threshold the last attempt was measured against, in `0..=100`.
    pub pass_threshold: u8,
    /// Whether the last attempt reached `pass_threshold`.
    pub passed: bool,
    pub last_session_id: SessionId,
    pub updated_at: DateTime<Utc>,
}

impl TopicQuizStats {
    /// Fold one more submitted quiz into `previous`.
    #[must_use]
    pub fn record(
        previous: Option<&Self>,
        owner_id: OwnerId,
        topic_id: TopicId,
        result: &AssessmentResult,
        pass_threshold: u8,
    ) -> Self {
        let score = result.total_score;
        let (attempt_count, best_score) = match previous {
            Some(prev) => (
                prev.attempt_count.saturating_add(1),
                prev.best_score.max(score),
            ),
            None => (1, score),
        };
        Self {
            owner_id,
            topic_id,
            attempt_count,
            last_score: score,
            best_score,
            pass_threshold,
            passed: score >= pass_threshold,
            last_session_id: result.session_id,
            updated_at: result.submitted_at,
        }
    }

    /// A topic may be marked complete once its latest quiz passed.
    #[must_use]
    pub fn can_mark_complete(&self) -> bool {
        self.passed
    }
}
