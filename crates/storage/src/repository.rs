use assess_core::model::{
    AiFeedback, Answer, AssessmentResult, DifficultyFilter, ItemId, OwnerId, Question,
    QuestionId, Scope, Session, SessionId, SessionState, TopicId, TopicQuizStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A conditional write lost: the open slot is taken, or the session is no
    /// longer in the state the write required.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One line of a learner's submitted-session history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub session_id: SessionId,
    pub scope: Scope,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub total_score: u8,
    pub question_count: u32,
}

/// A page of history rows plus the total number of submitted sessions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryPage {
    pub rows: Vec<HistoryRow>,
    pub total: u64,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read access to the question bank, plus an upsert used by seeding and tests.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or replace a question and its topic membership.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch a question by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;

    /// All active questions of a topic, ordered by `order_no` then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn active_for_topic(&self, topic_id: TopicId) -> Result<Vec<Question>, StorageError>;

    /// All active questions admitted by `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn active_pool(&self, filter: DifficultyFilter) -> Result<Vec<Question>, StorageError>;

    /// Number of active questions admitted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn count_active(&self, filter: DifficultyFilter) -> Result<u64, StorageError>;
}

/// Sessions, their frozen items and their results.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new non-terminal session with its items, atomically claiming
    /// the `(owner, scope)` slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another unfinished session already
    /// occupies the slot.
    async fn create_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Fetch a session with its items.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError>;

    /// The unfinished session occupying `(owner, scope)`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn find_open(
        &self,
        owner_id: OwnerId,
        scope: Scope,
    ) -> Result<Option<Session>, StorageError>;

    /// Move an in-progress session to submitted and store its result, in one step.
    ///
    /// For a topic session the owner's quiz stats on that topic are folded in
    /// the same step, judged against `pass_threshold`, and returned.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session is not in progress, or
    /// `StorageError::NotFound` if it does not exist.
    async fn complete_session(
        &self,
        id: SessionId,
        result: &AssessmentResult,
        pass_threshold: u8,
    ) -> Result<Option<TopicQuizStats>, StorageError>;

    /// Move a non-terminal session to discarded, freeing its slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session is already terminal, or
    /// `StorageError::NotFound` if it does not exist.
    async fn discard_session(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Fetch the result of a submitted session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no result exists.
    async fn get_result(&self, id: SessionId) -> Result<AssessmentResult, StorageError>;

    /// Attach AI feedback to an existing result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no result exists.
    async fn attach_feedback(
        &self,
        id: SessionId,
        feedback: &AiFeedback,
    ) -> Result<(), StorageError>;

    /// Submitted sessions of `owner_id`, newest submission first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_submitted(
        &self,
        owner_id: OwnerId,
        limit: u32,
        offset: u64,
    ) -> Result<HistoryPage, StorageError>;

    /// Quiz stats of `owner_id` on `topic_id`, if any quiz was submitted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn topic_quiz_stats(
        &self,
        owner_id: OwnerId,
        topic_id: TopicId,
    ) -> Result<Option<TopicQuizStats>, StorageError>;
}

/// Latest answer per item of a session.
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Insert or overwrite the answer for `(session_id, item_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` unless the session is in progress.
    async fn save_answer(&self, answer: &Answer) -> Result<(), StorageError>;

    /// All stored answers of a session, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn answers_for(&self, session_id: SessionId) -> Result<Vec<Answer>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    questions: BTreeMap<QuestionId, Question>,
    sessions: HashMap<SessionId, Session>,
    open: HashMap<(OwnerId, Scope), SessionId>,
    answers: HashMap<SessionId, HashMap<ItemId, Answer>>,
    results: HashMap<SessionId, AssessmentResult>,
    topic_quiz: HashMap<(OwnerId, TopicId), TopicQuizStats>,
}

/// In-memory repository for tests and prototyping.
///
/// All tables share one lock so every conditional write is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn topic_order(question: &Question) -> (u32, QuestionId) {
    (question.order_no(), question.id())
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.questions.insert(question.id(), question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let guard = self.lock()?;
        guard.questions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn active_for_topic(&self, topic_id: TopicId) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<Question> = guard
            .questions
            .values()
            .filter(|q| q.is_active() && q.topic_ids().contains(&topic_id))
            .cloned()
            .collect();
        found.sort_by_key(topic_order);
        Ok(found)
    }

    async fn active_pool(&self, filter: DifficultyFilter) -> Result<Vec<Question>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .questions
            .values()
            .filter(|q| q.is_active() && filter.admits(q.difficulty()))
            .cloned()
            .collect())
    }

    async fn count_active(&self, filter: DifficultyFilter) -> Result<u64, StorageError> {
        let guard = self.lock()?;
        let count = guard
            .questions
            .values()
            .filter(|q| q.is_active() && filter.admits(q.difficulty()))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        if session.state().is_terminal() {
            return Err(StorageError::Conflict);
        }
        let mut guard = self.lock()?;
        let slot = (session.owner_id(), session.scope());
        if guard.open.contains_key(&slot) || guard.sessions.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        guard.open.insert(slot, session.id());
        guard.sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let guard = self.lock()?;
        guard.sessions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_open(
        &self,
        owner_id: OwnerId,
        scope: Scope,
    ) -> Result<Option<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .open
            .get(&(owner_id, scope))
            .and_then(|id| guard.sessions.get(id))
            .cloned())
    }

    async fn complete_session(
        &self,
        id: SessionId,
        result: &AssessmentResult,
        pass_threshold: u8,
    ) -> Result<Option<TopicQuizStats>, StorageError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let session = state.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session
            .submit(result.submitted_at)
            .map_err(|_| StorageError::Conflict)?;
        let (owner_id, scope) = (session.owner_id(), session.scope());
        state.open.remove(&(owner_id, scope));
        state.results.insert(id, result.clone());

        let Scope::Topic(topic_id) = scope else {
            return Ok(None);
        };
        let key = (owner_id, topic_id);
        let stats = TopicQuizStats::record(
            state.topic_quiz.get(&key),
            owner_id,
            topic_id,
            result,
            pass_threshold,
        );
        state.topic_quiz.insert(key, stats);
        Ok(Some(stats))
    }

    async fn discard_session(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let session = state.sessions.get_mut(&id).ok_or(StorageError::NotFound)?;
        session.discard(at).map_err(|_| StorageError::Conflict)?;
        state.open.remove(&(session.owner_id(), session.scope()));
        Ok(())
    }

    async fn get_result(&self, id: SessionId) -> Result<AssessmentResult, StorageError> {
        let guard = self.lock()?;
        guard.results.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn attach_feedback(
        &self,
        id: SessionId,
        feedback: &AiFeedback,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let result = guard.results.get_mut(&id).ok_or(StorageError::NotFound)?;
        result.attach_feedback(feedback.clone());
        Ok(())
    }

    async fn list_submitted(
        &self,
        owner_id: OwnerId,
        limit: u32,
        offset: u64,
    ) -> Result<HistoryPage, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<HistoryRow> = guard
            .sessions
            .values()
            .filter(|s| s.owner_id() == owner_id && s.state() == SessionState::Submitted)
            .filter_map(|s| {
                let result = guard.results.get(&s.id())?;
                Some(HistoryRow {
                    session_id: s.id(),
                    scope: s.scope(),
                    started_at: s.created_at(),
                    submitted_at: result.submitted_at,
                    total_score: result.total_score,
                    question_count: u32::try_from(s.item_count()).unwrap_or(u32::MAX),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });

        let total = rows.len() as u64;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(skip).take(limit as usize).collect();
        Ok(HistoryPage { rows, total })
    }

    async fn topic_quiz_stats(
        &self,
        owner_id: OwnerId,
        topic_id: TopicId,
    ) -> Result<Option<TopicQuizStats>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.topic_quiz.get(&(owner_id, topic_id)).copied())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn save_answer(&self, answer: &Answer) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let in_progress = guard
            .sessions
            .get(&answer.session_id)
            .is_some_and(|s| s.state() == SessionState::InProgress);
        if !in_progress {
            return Err(StorageError::Conflict);
        }
        guard
            .answers
            .entry(answer.session_id)
            .or_default()
            .insert(answer.item_id, answer.clone());
        Ok(())
    }

    async fn answers_for(&self, session_id: SessionId) -> Result<Vec<Answer>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .answers
            .get(&session_id)
            .map(|by_item| by_item.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let answers: Arc<dyn AnswerRepository> = Arc::new(repo);
        Self {
            questions,
            sessions,
            answers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{
        AnswerKey, AnswerValue, Choice, Difficulty, Item, Response, TopicScore,
    };
    use assess_core::time::fixed_now;
    use chrono::Duration;

    fn question(id: u64, topic: u64, order_no: u32, difficulty: Difficulty) -> Question {
        Question::new(
            QuestionId::new(id),
            vec![TopicId::new(topic)],
            order_no,
            format!("Question {id}"),
            vec![Choice::new("A", "yes"), Choice::new("B", "no")],
            AnswerKey::Single {
                correct: "A".into(),
            },
            None,
            difficulty,
        )
        .unwrap()
    }

    fn running_session(owner: u64, scope: Scope) -> Session {
        let q = question(1, 1, 1, Difficulty::Beginner);
        let items = vec![Item::snapshot(ItemId::generate(), 1, &q)];
        let mut session =
            Session::new(SessionId::generate(), OwnerId::new(owner), scope, items, fixed_now())
                .unwrap();
        session.begin().unwrap();
        session
    }

    fn result_for(session: &Session, score: u8, at: DateTime<Utc>) -> AssessmentResult {
        AssessmentResult {
            session_id: session.id(),
            total_score: score,
            raw_score: f64::from(score),
            responses: vec![Response {
                item_id: session.items()[0].id,
                order_no: 1,
                is_correct: score == 100,
                credit: f64::from(score) / 100.0,
            }],
            breakdown: vec![TopicScore {
                topic_id: TopicId::new(1),
                item_count: 1,
                score,
            }],
            submitted_at: at,
            ai_summary: None,
            ai_recommendation: None,
        }
    }

    #[tokio::test]
    async fn topic_questions_come_back_in_order_and_active_only() {
        let repo = InMemoryRepository::new();
        repo.upsert_question(&question(1, 7, 2, Difficulty::Beginner))
            .await
            .unwrap();
        repo.upsert_question(&question(2, 7, 1, Difficulty::Advanced))
            .await
            .unwrap();
        repo.upsert_question(&question(3, 7, 3, Difficulty::Beginner).with_active(false))
            .await
            .unwrap();
        repo.upsert_question(&question(4, 8, 1, Difficulty::Beginner))
            .await
            .unwrap();

        let ids: Vec<u64> = repo
            .active_for_topic(TopicId::new(7))
            .await
            .unwrap()
            .iter()
            .map(|q| q.id().value())
            .collect();
        assert_eq!(ids, vec![2, 1]);

        let beginner = DifficultyFilter::Only(Difficulty::Beginner);
        assert_eq!(repo.count_active(beginner).await.unwrap(), 2);
        assert_eq!(repo.count_active(DifficultyFilter::Mixed).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn second_open_session_for_same_slot_conflicts() {
        let repo = InMemoryRepository::new();
        let first = running_session(1, Scope::Global);
        repo.create_session(&first).await.unwrap();

        let second = running_session(1, Scope::Global);
        let err = repo.create_session(&second).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let other_scope = running_session(1, Scope::Topic(TopicId::new(3)));
        repo.create_session(&other_scope).await.unwrap();

        repo.discard_session(first.id(), fixed_now()).await.unwrap();
        repo.create_session(&second).await.unwrap();
        let open = repo.find_open(OwnerId::new(1), Scope::Global).await.unwrap();
        assert_eq!(open.map(|s| s.id()), Some(second.id()));
    }

    #[tokio::test]
    async fn completing_twice_conflicts_and_freezes_answers() {
        let repo = InMemoryRepository::new();
        let session = running_session(1, Scope::Global);
        repo.create_session(&session).await.unwrap();

        let item_id = session.items()[0].id;
        let answer = Answer::new(
            session.id(),
            item_id,
            AnswerValue::Single("A".into()),
            fixed_now(),
        );
        repo.save_answer(&answer).await.unwrap();

        let result = result_for(&session, 100, fixed_now());
        let stats = repo.complete_session(session.id(), &result, 80).await.unwrap();
        assert!(stats.is_none());
        let err = repo
            .complete_session(session.id(), &result, 80)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let err = repo.save_answer(&answer).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert_eq!(
            repo.get_session(session.id()).await.unwrap().state(),
            SessionState::Submitted
        );
        assert!(
            repo.find_open(OwnerId::new(1), Scope::Global)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paged() {
        let repo = InMemoryRepository::new();
        for i in 0..3 {
            let session = running_session(5, Scope::Topic(TopicId::new(i)));
            repo.create_session(&session).await.unwrap();
            let at = fixed_now() + Duration::minutes(i64::try_from(i).unwrap());
            repo.complete_session(session.id(), &result_for(&session, 50, at), 80)
                .await
                .unwrap();
        }
        let stranger = running_session(6, Scope::Global);
        repo.create_session(&stranger).await.unwrap();

        let page = repo.list_submitted(OwnerId::new(5), 2, 0).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].scope, Scope::Topic(TopicId::new(2)));
        assert_eq!(page.rows[1].scope, Scope::Topic(TopicId::new(1)));

        let tail = repo.list_submitted(OwnerId::new(5), 2, 2).await.unwrap();
        assert_eq!(tail.rows.len(), 1);
        assert_eq!(tail.rows[0].scope, Scope::Topic(TopicId::new(0)));
    }

    #[tokio::test]
    async fn topic_completion_folds_quiz_stats() {
        let repo = InMemoryRepository::new();
        let scope = Scope::Topic(TopicId::new(4));
        let owner = OwnerId::new(2);
        assert!(
            repo.topic_quiz_stats(owner, TopicId::new(4))
                .await
                .unwrap()
                .is_none()
        );

        for (minute, score) in [(0, 85), (1, 60)] {
            let session = running_session(2, scope);
            repo.create_session(&session).await.unwrap();
            let at = fixed_now() + Duration::minutes(minute);
            repo.complete_session(session.id(), &result_for(&session, score, at), 80)
                .await
                .unwrap();
        }

        let stats = repo
            .topic_quiz_stats(owner, TopicId::new(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.attempt_count, 2);
        assert_eq!(stats.last_score, 60);
        assert_eq!(stats.best_score, 85);
        assert!(!stats.passed);
        assert!(
            repo.topic_quiz_stats(OwnerId::new(3), TopicId::new(4))
                .await
                .unwrap()
                .is_none()
        );
    }
}
