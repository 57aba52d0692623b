mod answer;
mod ids;
mod item;
mod progress;
mod question;
mod result;
mod session;
mod topic_quiz;

pub use ids::{ItemId, OptionId, OwnerId, ParseIdError, QuestionId, SessionId, TopicId};

pub use answer::{Answer, AnswerError, AnswerValue};
pub use item::Item;
pub use progress::Progress;
pub use question::{
    AnswerKey, Choice, Difficulty, DifficultyFilter, Question, QuestionError, QuestionKind,
};
pub use result::{AiFeedback, AssessmentResult, Recommendation, Response, TopicScore};
pub use session::{Scope, Session, SessionState, SessionStateError};
pub use topic_quiz::TopicQuizStats;
