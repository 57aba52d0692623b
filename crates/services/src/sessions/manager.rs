use std::sync::Arc;

use tokio::task::JoinHandle;

use assess_core::model::{
    AssessmentResult, DifficultyFilter, OwnerId, Progress, Scope, Session, SessionId, SessionState,
    TopicId, TopicQuizStats,
};
use storage::repository::{AnswerRepository, SessionRepository, Storage, StorageError};

use crate::Clock;
use crate::ai::{AdviceRequest, Enricher};
use crate::config::EngineConfig;
use crate::error::{AssessmentError, Missing, ValidationError};

use super::locks::SessionLocks;
use super::progress::{ProgressTracker, answer_map};
use super::results::ResultAssembler;
use super::selection::{QuestionBank, snapshot_items};
use super::view::{
    HistoryView, ItemView, Pagination, ResumedSession, SavedAnswer, SessionDetail, SessionView,
    StartedSession,
};
use super::{ensure_in_progress, load_owned, terminal_error};

/// Options for a new session. Both apply to global scope only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub difficulty: Option<DifficultyFilter>,
    pub count: Option<u32>,
}

impl StartOptions {
    fn is_empty(self) -> bool {
        self.difficulty.is_none() && self.count.is_none()
    }
}

/// A graded session plus the handle of its background enrichment, if any.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub result: AssessmentResult,
    /// Updated quiz stats, for topic sessions only.
    pub topic_quiz: Option<TopicQuizStats>,
    pub enrichment: Option<JoinHandle<()>>,
}

/// Owns the session lifecycle: start, resume, submit, discard, and the
/// read-only history views of submitted sessions.
#[derive(Clone)]
pub struct SessionManager {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    answers: Arc<dyn AnswerRepository>,
    bank: QuestionBank,
    config: EngineConfig,
    locks: Arc<SessionLocks>,
    enricher: Option<Enricher>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        clock: Clock,
        storage: &Storage,
        config: EngineConfig,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            clock,
            sessions: Arc::clone(&storage.sessions),
            answers: Arc::clone(&storage.answers),
            bank: QuestionBank::new(Arc::clone(&storage.questions)),
            config,
            locks,
            enricher: None,
        }
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Start a new in-progress session for `(owner_id, scope)`.
    ///
    /// Global sessions draw `count` distinct questions (default from config)
    /// admitted by `difficulty` (default mixed). Topic sessions take every
    /// active question of the topic in stored order; an empty topic yields an
    /// empty session.
    ///
    /// # Errors
    ///
    /// - `UnfinishedSessionExists` if the slot already holds a non-terminal session.
    /// - `InsufficientQuestions` if the global pool is smaller than `count`.
    /// - `Validation` for an out-of-range count or options on a topic scope.
    pub async fn start(
        &self,
        owner_id: OwnerId,
        scope: Scope,
        options: StartOptions,
    ) -> Result<StartedSession, AssessmentError> {
        if let Some(open) = self.sessions.find_open(owner_id, scope).await? {
            return Err(AssessmentError::UnfinishedSessionExists {
                session_id: open.id(),
            });
        }

        let questions = match scope {
            Scope::Global => {
                let count = options.count.unwrap_or(self.config.default_global_count);
                if count == 0 || count > self.config.max_global_count {
                    return Err(ValidationError::CountOutOfRange {
                        count,
                        max: self.config.max_global_count,
                    }
                    .into());
                }
                let filter = options.difficulty.unwrap_or_default();
                self.bank.select_for_global(filter, count).await?
            }
            Scope::Topic(topic_id) => {
                if !options.is_empty() {
                    return Err(ValidationError::OptionsRequireGlobalScope.into());
                }
                self.bank.select_for_topic(topic_id).await?
            }
        };

        let mut session = Session::new(
            SessionId::generate(),
            owner_id,
            scope,
            snapshot_items(&questions),
            self.clock.now(),
        )?;
        session.begin()?;

        match self.sessions.create_session(&session).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                // Lost the check-and-create race to a concurrent start.
                return Err(match self.sessions.find_open(owner_id, scope).await? {
                    Some(open) => AssessmentError::UnfinishedSessionExists {
                        session_id: open.id(),
                    },
                    None => AssessmentError::ConcurrentUpdate,
                });
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            session_id = %session.id(),
            %owner_id,
            scope = %scope,
            items = session.item_count(),
            "session started"
        );

        Ok(StartedSession {
            session: SessionView::from_session(&session),
            items: ItemView::list(&session),
            progress: Progress::fresh(session.item_count()),
        })
    }

    /// The unfinished session of `(owner_id, scope)` with its saved answers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound(OpenSession)` if there is none.
    pub async fn resume(
        &self,
        owner_id: OwnerId,
        scope: Scope,
    ) -> Result<ResumedSession, AssessmentError> {
        let session = self
            .sessions
            .find_open(owner_id, scope)
            .await?
            .ok_or(AssessmentError::NotFound(Missing::OpenSession))?;
        let stored = self.answers.answers_for(session.id()).await?;

        Ok(ResumedSession {
            session: SessionView::from_session(&session),
            items: ItemView::list(&session),
            answers: SavedAnswer::list(&session, &stored),
            progress: ProgressTracker::compute(&session, &stored),
        })
    }

    /// Grade and close a session.
    ///
    /// Without `force`, every item must carry a non-empty answer. With it,
    /// unanswered items score zero. Enrichment, when configured, runs on a
    /// detached task and never affects the returned result.
    ///
    /// # Errors
    ///
    /// - `NotFound(Session)` if the session is unknown or owned by someone else.
    /// - `SessionAlreadySubmitted` / `SessionDiscarded` for terminal sessions.
    /// - `MissingAnswers` listing unanswered order numbers when not forced.
    pub async fn submit(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
        force: bool,
    ) -> Result<SubmitOutcome, AssessmentError> {
        let guard = self.locks.write(session_id).await;

        let mut session = load_owned(self.sessions.as_ref(), session_id, owner_id).await?;
        ensure_in_progress(&session)?;

        let answers = answer_map(&self.answers.answers_for(session_id).await?);
        let missing = ResultAssembler::missing_order_nos(&session, &answers);
        if !missing.is_empty() && !force {
            return Err(AssessmentError::MissingAnswers {
                missing_order_nos: missing,
            });
        }

        let submitted_at = self.clock.now();
        session.submit(submitted_at)?;
        let result = ResultAssembler::assemble(&session, &answers, submitted_at);

        let topic_quiz = match self
            .sessions
            .complete_session(session_id, &result, self.config.topic_pass_threshold)
            .await
        {
            Ok(stats) => stats,
            Err(StorageError::Conflict) => {
                let current = self.sessions.get_session(session_id).await?;
                return Err(terminal_error(current.state()));
            }
            Err(err) => return Err(err.into()),
        };
        drop(guard);

        tracing::info!(
            %session_id,
            total_score = result.total_score,
            unanswered = missing.len(),
            forced = force,
            passed = topic_quiz.map(|stats| stats.passed),
            "session submitted"
        );

        let enrichment = self
            .enricher
            .as_ref()
            .map(|enricher| enricher.spawn(AdviceRequest::new(session.scope(), &result)));

        Ok(SubmitOutcome {
            result,
            topic_quiz,
            enrichment,
        })
    }

    /// Abandon a non-terminal session, freeing its slot.
    ///
    /// # Errors
    ///
    /// - `NotFound(Session)` if the session is unknown or owned by someone else.
    /// - `SessionAlreadySubmitted` / `SessionDiscarded` for terminal sessions.
    pub async fn discard(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
    ) -> Result<SessionView, AssessmentError> {
        let guard = self.locks.write(session_id).await;

        let mut session = load_owned(self.sessions.as_ref(), session_id, owner_id).await?;
        if session.state().is_terminal() {
            return Err(terminal_error(session.state()));
        }

        let discarded_at = self.clock.now();
        session.discard(discarded_at)?;
        match self.sessions.discard_session(session_id, discarded_at).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                let current = self.sessions.get_session(session_id).await?;
                return Err(terminal_error(current.state()));
            }
            Err(err) => return Err(err.into()),
        }
        drop(guard);

        tracing::info!(%session_id, scope = %session.scope(), "session discarded");
        Ok(SessionView::from_session(&session))
    }

    //
    // ─── HISTORY ───────────────────────────────────────────────────────────────
    //

    /// Submitted sessions of `owner_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `page >= 1` and `1 <= limit <= history_max_limit`.
    pub async fn history(
        &self,
        owner_id: OwnerId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryView, AssessmentError> {
        if page == 0 {
            return Err(ValidationError::PageOutOfRange.into());
        }
        let max = self.config.history_max_limit;
        if limit == 0 || limit > max {
            return Err(ValidationError::LimitOutOfRange { limit, max }.into());
        }

        let offset = u64::from(page - 1) * u64::from(limit);
        let found = self.sessions.list_submitted(owner_id, limit, offset).await?;
        Ok(HistoryView {
            items: found.rows,
            pagination: Pagination::new(page, limit, found.total),
        })
    }

    /// Full replay of a submitted session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound(Session)` unless the session exists, belongs to
    /// `owner_id`, and has been submitted.
    pub async fn detail(
        &self,
        session_id: SessionId,
        owner_id: OwnerId,
    ) -> Result<SessionDetail, AssessmentError> {
        let session = load_owned(self.sessions.as_ref(), session_id, owner_id).await?;
        if session.state() != SessionState::Submitted {
            return Err(AssessmentError::NotFound(Missing::Session));
        }

        let result = match self.sessions.get_result(session_id).await {
            Ok(result) => result,
            Err(StorageError::NotFound) => return Err(AssessmentError::NotFound(Missing::Result)),
            Err(err) => return Err(err.into()),
        };
        let stored = self.answers.answers_for(session_id).await?;
        Ok(SessionDetail::build(&session, &stored, result))
    }

    /// Quiz stats of `owner_id` on `topic_id`; `None` before the first submitted quiz.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on repository failures.
    pub async fn topic_quiz(
        &self,
        owner_id: OwnerId,
        topic_id: TopicId,
    ) -> Result<Option<TopicQuizStats>, AssessmentError> {
        Ok(self.sessions.topic_quiz_stats(owner_id, topic_id).await?)
    }

    /// Size of the global pool admitted by `filter`, to bound `count` before starting.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on repository failures.
    pub async fn availability(&self, filter: DifficultyFilter) -> Result<u64, AssessmentError> {
        self.bank.availability(filter).await
    }
}
