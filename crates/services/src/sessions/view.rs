use chrono::{DateTime, Utc};
use serde::Serialize;

use assess_core::model::{
    Answer, AssessmentResult, Choice, Difficulty, Item, ItemId, OwnerId, Progress, QuestionKind,
    Response, Scope, Session, SessionId, SessionState, TopicId,
};
use storage::repository::HistoryRow;

/// Session header without its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub owner_id: OwnerId,
    pub scope: Scope,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub item_count: usize,
}

impl SessionView {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            id: session.id(),
            owner_id: session.owner_id(),
            scope: session.scope(),
            state: session.state(),
            created_at: session.created_at(),
            submitted_at: session.submitted_at(),
            item_count: session.item_count(),
        }
    }
}

/// An item as shown while the session is running: no key, no explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub order_no: u32,
    pub kind: QuestionKind,
    pub stem: String,
    pub choices: Vec<Choice>,
    pub difficulty: Difficulty,
    pub topic_ids: Vec<TopicId>,
}

impl ItemView {
    #[must_use]
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: item.id,
            order_no: item.order_no,
            kind: item.kind(),
            stem: item.stem.clone(),
            choices: item.choices.clone(),
            difficulty: item.difficulty,
            topic_ids: item.topic_ids.clone(),
        }
    }

    #[must_use]
    pub fn list(session: &Session) -> Vec<Self> {
        session.items().iter().map(Self::from_item).collect()
    }
}

/// Reply to `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedSession {
    pub session: SessionView,
    pub items: Vec<ItemView>,
    pub progress: Progress,
}

/// A stored answer in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedAnswer {
    pub item_id: ItemId,
    pub order_no: u32,
    pub value: String,
    pub saved_at: DateTime<Utc>,
}

impl SavedAnswer {
    /// Wire views of `answers` ordered by item position. Answers for
    /// items outside the session are skipped.
    #[must_use]
    pub fn list(session: &Session, answers: &[Answer]) -> Vec<Self> {
        let mut out: Vec<Self> = answers
            .iter()
            .filter_map(|answer| {
                let item = session.item(answer.item_id)?;
                Some(Self {
                    item_id: answer.item_id,
                    order_no: item.order_no,
                    value: answer.value.to_wire(),
                    saved_at: answer.saved_at,
                })
            })
            .collect();
        out.sort_by_key(|a| a.order_no);
        out
    }
}

/// Reply to `resume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumedSession {
    pub session: SessionView,
    pub items: Vec<ItemView>,
    pub answers: Vec<SavedAnswer>,
    pub progress: Progress,
}

/// Reply to a saved answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub item_id: ItemId,
    /// Canonical wire form of what was stored.
    pub value: String,
    pub progress: Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    #[must_use]
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Reply to `history`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub items: Vec<HistoryRow>,
    pub pagination: Pagination,
}

/// One item of a submitted session, with everything needed to replay it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailItem {
    #[serde(flatten)]
    pub item: ItemView,
    pub answer: Option<String>,
    pub is_correct: bool,
    pub credit: f64,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

/// Reply to `detail`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDetail {
    pub session: SessionView,
    pub items: Vec<DetailItem>,
    pub result: AssessmentResult,
}

impl SessionDetail {
    #[must_use]
    pub fn build(session: &Session, answers: &[Answer], result: AssessmentResult) -> Self {
        let items = session
            .items()
            .iter()
            .map(|item| {
                let answer = answers
                    .iter()
                    .find(|a| a.item_id == item.id)
                    .map(|a| a.value.to_wire());
                let (is_correct, credit) = result
                    .response(item.id)
                    .map_or((false, 0.0), |r: &Response| (r.is_correct, r.credit));
                DetailItem {
                    item: ItemView::from_item(item),
                    answer,
                    is_correct,
                    credit,
                    correct_answer: item.key.display_answer(),
                    explanation: item.explanation.clone(),
                }
            })
            .collect();

        Self {
            session: SessionView::from_session(session),
            items,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_pages_up() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(Pagination::new(2, 10, 11).total_pages, 2);
    }
}
