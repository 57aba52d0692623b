use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{ItemId, SessionId, TopicId};

/// Grading outcome for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub item_id: ItemId,
    pub order_no: u32,
    /// Whether the answer counts as correct. For multi-select this means an
    /// exact set match, independent of partial credit.
    pub is_correct: bool,
    /// Fractional credit in `0.0..=1.0`.
    pub credit: f64,
}

/// Score for the items of one topic within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScore {
    pub topic_id: TopicId,
    pub item_count: u32,
    pub score: u8,
}

/// Study advice returned by the AI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recommendation {
    pub level: String,
    #[serde(default)]
    pub focus_topics: Vec<String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

/// Best-effort enrichment attached to a result after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiFeedback {
    pub summary: String,
    pub recommendation: Recommendation,
}

/// Final outcome of a submitted session. Computed once, at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub session_id: SessionId,
    /// Rounded aggregate score in `0..=100`.
    pub total_score: u8,
    /// Unrounded aggregate score.
    pub raw_score: f64,
    pub responses: Vec<Response>,
    pub breakdown: Vec<TopicScore>,
    pub submitted_at: DateTime<Utc>,
    pub ai_summary: Option<String>,
    pub ai_recommendation: Option<Recommendation>,
}

impl AssessmentResult {
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_correct).count()
    }

    #[must_use]
    pub fn response(&self, item_id: ItemId) -> Option<&Response> {
        self.responses.iter().find(|r| r.item_id == item_id)
    }

    #[must_use]
    pub fn is_enriched(&self) -> bool {
        self.ai_summary.is_some()
    }

    /// Attach AI feedback. A later call replaces an earlier one.
    pub fn attach_feedback(&mut self, feedback: AiFeedback) {
        self.ai_summary = Some(feedback.summary);
        self.ai_recommendation = Some(feedback.recommendation);
    }
}
