#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AnswerRepository, HistoryPage, HistoryRow, InMemoryRepository, QuestionRepository,
    SessionRepository, Storage, StorageError,
};
