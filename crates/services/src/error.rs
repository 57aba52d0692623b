//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::{AnswerError, SessionId, SessionStateError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Session,
    Item,
    OpenSession,
    Result,
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Missing::Session => "session",
            Missing::Item => "item",
            Missing::OpenSession => "unfinished session",
            Missing::Result => "result",
        })
    }
}

/// Caller-correctable input problems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("count must be between 1 and {max}, got {count}")]
    CountOutOfRange { count: u32, max: u32 },
    #[error("difficulty and count apply to global assessments only")]
    OptionsRequireGlobalScope,
    #[error("page must be at least 1")]
    PageOutOfRange,
    #[error("limit must be between 1 and {max}, got {limit}")]
    LimitOutOfRange { limit: u32, max: u32 },
    #[error("last index must be between 1 and {total}, got {index}")]
    PositionOutOfRange { index: u32, total: usize },
    #[error(transparent)]
    Answer(#[from] AnswerError),
}

/// Errors emitted by the session engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("an unfinished session already exists: {session_id}")]
    UnfinishedSessionExists { session_id: SessionId },
    #[error("not enough questions: {available} available, {requested} requested")]
    InsufficientQuestions { available: u64, requested: u32 },
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("session already submitted")]
    SessionAlreadySubmitted,
    #[error("session was discarded")]
    SessionDiscarded,
    /// A conditional write lost while the session was still in progress.
    #[error("session was modified concurrently")]
    ConcurrentUpdate,
    #[error("unanswered questions: {missing_order_nos:?}")]
    MissingAnswers { missing_order_nos: Vec<u32> },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<AnswerError> for AssessmentError {
    fn from(err: AnswerError) -> Self {
        Self::Validation(ValidationError::Answer(err))
    }
}

/// Errors emitted by AI advisors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdvisorError {
    #[error("assessment advisor returned an empty response")]
    EmptyResponse,
    #[error("assessment advisor returned malformed feedback: {0}")]
    InvalidResponse(String),
    #[error("assessment advisor request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while reading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
    #[error("{0}")]
    Inconsistent(String),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
