use std::sync::Arc;

use rand::rng;
use rand::seq::SliceRandom;

use assess_core::model::{DifficultyFilter, Item, ItemId, Question, TopicId};
use storage::repository::QuestionRepository;

use crate::error::AssessmentError;

/// Picks the questions a new session is built from.
#[derive(Clone)]
pub struct QuestionBank {
    questions: Arc<dyn QuestionRepository>,
}

impl QuestionBank {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    /// Number of active questions a global assessment with `filter` could draw from.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::Storage` on repository failures.
    pub async fn availability(&self, filter: DifficultyFilter) -> Result<u64, AssessmentError> {
        Ok(self.questions.count_active(filter).await?)
    }

    /// Sample `count` distinct active questions admitted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::InsufficientQuestions` when the pool is smaller
    /// than `count`.
    pub async fn select_for_global(
        &self,
        filter: DifficultyFilter,
        count: u32,
    ) -> Result<Vec<Question>, AssessmentError> {
        let pool = self.questions.active_pool(filter).await?;
        let wanted = usize::try_from(count).unwrap_or(usize::MAX);
        if pool.len() < wanted {
            return Err(AssessmentError::InsufficientQuestions {
                available: pool.len() as u64,
                requested: count,
            });
        }
        let picked = sample(pool, wanted);
        tracing::debug!(
            difficulty = filter.as_str(),
            count = picked.len(),
            "selected global questions"
        );
        Ok(picked)
    }

    /// Every active question of a topic in stored order, unsampled.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::Storage` on repository failures.
    pub async fn select_for_topic(
        &self,
        topic_id: TopicId,
    ) -> Result<Vec<Question>, AssessmentError> {
        let questions = self.questions.active_for_topic(topic_id).await?;
        tracing::debug!(%topic_id, count = questions.len(), "selected topic questions");
        Ok(questions)
    }
}

fn sample(mut pool: Vec<Question>, count: usize) -> Vec<Question> {
    pool.shuffle(&mut rng());
    pool.truncate(count);
    pool
}

/// Freeze `questions` into items numbered `1..=N` in the given order.
#[must_use]
pub fn snapshot_items(questions: &[Question]) -> Vec<Item> {
    questions
        .iter()
        .zip(1..)
        .map(|(question, order_no)| Item::snapshot(ItemId::generate(), order_no, question))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{AnswerKey, Choice, Difficulty, QuestionId};
    use std::collections::HashSet;
    use storage::repository::InMemoryRepository;

    fn question(id: u64, difficulty: Difficulty) -> Question {
        Question::new(
            QuestionId::new(id),
            vec![TopicId::new(1 + id % 2)],
            u32::try_from(id).unwrap(),
            format!("Q{id}"),
            vec![Choice::new("A", "a"), Choice::new("B", "b")],
            AnswerKey::Single {
                correct: "A".into(),
            },
            None,
            difficulty,
        )
        .unwrap()
    }

    async fn bank() -> QuestionBank {
        let repo = InMemoryRepository::new();
        for id in 1..=10 {
            let difficulty = if id <= 6 {
                Difficulty::Beginner
            } else {
                Difficulty::Advanced
            };
            repo.upsert_question(&question(id, difficulty)).await.unwrap();
        }
        QuestionBank::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn global_sample_is_distinct_and_filtered() {
        let bank = bank().await;
        let picked = bank
            .select_for_global(DifficultyFilter::Only(Difficulty::Beginner), 5)
            .await
            .unwrap();
        assert_eq!(picked.len(), 5);
        let ids: HashSet<QuestionId> = picked.iter().map(Question::id).collect();
        assert_eq!(ids.len(), 5);
        assert!(picked.iter().all(|q| q.difficulty() == Difficulty::Beginner));
    }

    #[tokio::test]
    async fn global_sample_reports_shortfall() {
        let bank = bank().await;
        let filter = DifficultyFilter::Only(Difficulty::Advanced);
        assert_eq!(bank.availability(filter).await.unwrap(), 4);
        let err = bank.select_for_global(filter, 5).await.unwrap_err();
        assert!(matches!(
            err,
            AssessmentError::InsufficientQuestions {
                available: 4,
                requested: 5
            }
        ));
    }

    #[tokio::test]
    async fn topic_selection_keeps_stored_order() {
        let bank = bank().await;
        let picked = bank.select_for_topic(TopicId::new(2)).await.unwrap();
        let ids: Vec<u64> = picked.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9]);

        let items = snapshot_items(&picked);
        let order: Vec<u32> = items.iter().map(|i| i.order_no).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert_eq!(items[2].question_id, QuestionId::new(5));
    }
}
