use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::ai::{AssessmentAdvisor, Enricher, HttpAdvisor};
use crate::config::EngineConfig;
use crate::error::AppServicesError;
use crate::sessions::{AnswerStore, SessionLocks, SessionManager};

/// Assembles the session engine over one storage backend.
///
/// The manager and the answer store share one lock registry, so saves and
/// submits of the same session exclude each other.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    sessions: Arc<SessionManager>,
    answers: Arc<AnswerStore>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, configured from the environment.
    ///
    /// AI enrichment is enabled when `ASSESS_AI_API_KEY` is set.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if configuration is invalid or storage
    /// initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let config = EngineConfig::from_env()?;
        let storage = Storage::sqlite(db_url).await?;
        let advisor = HttpAdvisor::from_env().map(|a| Arc::new(a) as Arc<dyn AssessmentAdvisor>);
        Ok(Self::with_parts(storage, clock, config, advisor))
    }

    /// Build services backed by in-memory storage.
    #[must_use]
    pub fn in_memory(clock: Clock, config: EngineConfig) -> Self {
        Self::with_parts(Storage::in_memory(), clock, config, None)
    }

    #[must_use]
    pub fn with_parts(
        storage: Storage,
        clock: Clock,
        config: EngineConfig,
        advisor: Option<Arc<dyn AssessmentAdvisor>>,
    ) -> Self {
        let locks = Arc::new(SessionLocks::new());
        let mut manager = SessionManager::new(clock, &storage, config, Arc::clone(&locks));
        if let Some(advisor) = advisor {
            manager = manager.with_enricher(Enricher::new(
                advisor,
                Arc::clone(&storage.sessions),
                config.enrichment_timeout,
            ));
        }
        let answers = AnswerStore::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.answers),
            locks,
        );

        Self {
            storage,
            sessions: Arc::new(manager),
            answers: Arc::new(answers),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn answers(&self) -> Arc<AnswerStore> {
        Arc::clone(&self.answers)
    }
}
