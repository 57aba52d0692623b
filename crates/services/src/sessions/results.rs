use std::collections::HashMap;

use assess_core::grader;
use assess_core::model::{AnswerValue, AssessmentResult, ItemId, Session};
use chrono::{DateTime, Utc};

/// Builds the final result of a session from its items and answers.
pub struct ResultAssembler;

impl ResultAssembler {
    /// Grade every item and assemble the result. Missing answers score 0.
    ///
    /// The result carries no AI feedback; enrichment attaches it later.
    #[must_use]
    pub fn assemble(
        session: &Session,
        answers: &HashMap<ItemId, AnswerValue>,
        submitted_at: DateTime<Utc>,
    ) -> AssessmentResult {
        let grade = grader::grade(session.items(), answers);
        let breakdown = grader::topic_breakdown(session.items(), &grade.responses);
        AssessmentResult {
            session_id: session.id(),
            total_score: grade.total_score,
            raw_score: grade.raw_score,
            responses: grade.responses,
            breakdown,
            submitted_at,
            ai_summary: None,
            ai_recommendation: None,
        }
    }

    /// Order numbers of items with no usable answer, ascending.
    #[must_use]
    pub fn missing_order_nos(
        session: &Session,
        answers: &HashMap<ItemId, AnswerValue>,
    ) -> Vec<u32> {
        session
            .items()
            .iter()
            .filter(|item| answers.get(&item.id).is_none_or(AnswerValue::is_empty))
            .map(|item| item.order_no)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{
        AnswerKey, Choice, Difficulty, Item, OwnerId, Question, QuestionId, Scope, SessionId,
        TopicId,
    };
    use assess_core::time::fixed_now;

    fn session() -> Session {
        let topics = [1, 1, 2];
        let items = topics
            .iter()
            .zip(1..)
            .map(|(topic, order_no)| {
                let q = Question::new(
                    QuestionId::new(u64::from(order_no)),
                    vec![TopicId::new(*topic)],
                    order_no,
                    "Pick",
                    vec![Choice::new("A", "a"), Choice::new("B", "b")],
                    AnswerKey::Single {
                        correct: "A".into(),
                    },
                    None,
                    Difficulty::Intermediate,
                )
                .unwrap();
                Item::snapshot(ItemId::generate(), order_no, &q)
            })
            .collect();
        Session::new(
            SessionId::generate(),
            OwnerId::new(1),
            Scope::Global,
            items,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn assembles_scores_and_breakdown() {
        let s = session();
        let answers = HashMap::from([
            (s.items()[0].id, AnswerValue::Single("A".into())),
            (s.items()[2].id, AnswerValue::Single("A".into())),
        ]);
        let result = ResultAssembler::assemble(&s, &answers, fixed_now());

        assert_eq!(result.session_id, s.id());
        assert_eq!(result.total_score, 67);
        assert_eq!(result.correct_count(), 2);
        assert_eq!(result.breakdown.len(), 2);
        assert_eq!(result.breakdown[0].score, 50);
        assert_eq!(result.breakdown[1].score, 100);
        assert!(!result.is_enriched());
    }

    #[test]
    fn missing_items_include_blank_answers() {
        let s = session();
        let answers = HashMap::from([
            (s.items()[0].id, AnswerValue::Single("A".into())),
            (s.items()[1].id, AnswerValue::Single("".into())),
        ]);
        assert_eq!(ResultAssembler::missing_order_nos(&s, &answers), vec![2, 3]);
    }
}
