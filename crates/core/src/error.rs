use thiserror::Error;

use crate::model::{AnswerError, QuestionError, SessionStateError};

/// Any domain-rule violation raised by this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionKind, SessionState};

    #[test]
    fn domain_errors_convert_and_keep_their_message() {
        let err: Error = SessionStateError::InvalidTransition {
            from: SessionState::Submitted,
            to: SessionState::InProgress,
        }
        .into();
        assert!(matches!(err, Error::Session(_)));
        assert_eq!(err.to_string(), "cannot move session from submitted to in_progress");

        let err: Error = AnswerError::KindMismatch {
            expected: QuestionKind::Single,
            found: QuestionKind::Short,
        }
        .into();
        assert!(matches!(err, Error::Answer(_)));
    }
}
