mod answers;
mod locks;
mod manager;
mod progress;
mod results;
mod selection;
mod view;

use assess_core::model::{OwnerId, Session, SessionId, SessionState, SessionStateError};
use storage::repository::{SessionRepository, StorageError};

use crate::error::{AssessmentError, Missing};

// Public API of the session subsystem.
pub use answers::AnswerStore;
pub use locks::{SessionGuard, SessionLocks, SessionReadGuard, SessionWriteGuard};
pub use manager::{SessionManager, StartOptions, SubmitOutcome};
pub use progress::{ProgressTracker, answer_map};
pub use results::ResultAssembler;
pub use selection::{QuestionBank, snapshot_items};
pub use view::{
    DetailItem, HistoryView, ItemView, Pagination, ResumedSession, SaveOutcome, SavedAnswer,
    SessionDetail, SessionView, StartedSession,
};

/// Load a session on behalf of `owner_id`. Someone else's session is reported
/// as missing.
async fn load_owned(
    sessions: &dyn SessionRepository,
    id: SessionId,
    owner_id: OwnerId,
) -> Result<Session, AssessmentError> {
    match sessions.get_session(id).await {
        Ok(session) if session.owner_id() == owner_id => Ok(session),
        Ok(_) | Err(StorageError::NotFound) => Err(AssessmentError::NotFound(Missing::Session)),
        Err(err) => Err(err.into()),
    }
}

fn ensure_in_progress(session: &Session) -> Result<(), AssessmentError> {
    match session.state() {
        SessionState::InProgress => Ok(()),
        state => Err(terminal_error(state)),
    }
}

/// Error for a write that found the session in `state` instead of in progress.
fn terminal_error(state: SessionState) -> AssessmentError {
    match state {
        SessionState::Submitted => AssessmentError::SessionAlreadySubmitted,
        SessionState::Discarded => AssessmentError::SessionDiscarded,
        SessionState::InProgress => AssessmentError::ConcurrentUpdate,
        from => SessionStateError::InvalidTransition {
            from,
            to: SessionState::InProgress,
        }
        .into(),
    }
}
