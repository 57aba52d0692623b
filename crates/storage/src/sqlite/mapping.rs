use assess_core::model::{
    Answer, AnswerKey, AnswerValue, AssessmentResult, Choice, Difficulty, Item, ItemId, OwnerId,
    Question, QuestionId, QuestionKind, Recommendation, Scope, Session, SessionId, SessionState,
    TopicId, TopicQuizStats,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{HistoryRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

fn session_id(row: &SqliteRow, column: &str) -> Result<SessionId, StorageError> {
    row.try_get::<String, _>(column)
        .map_err(ser)?
        .parse::<SessionId>()
        .map_err(ser)
}

/// Builds a bank question from a `questions` row and its topic ids.
pub(crate) fn map_question_row(
    row: &SqliteRow,
    topic_ids: Vec<TopicId>,
) -> Result<Question, StorageError> {
    let id = QuestionId::new(i64_to_u64("question_id", row.try_get("id").map_err(ser)?)?);
    let order_no = u32_from_i64("order_no", row.try_get("order_no").map_err(ser)?)?;
    let choices: Vec<Choice> = from_json(&row.try_get::<String, _>("choices").map_err(ser)?)?;
    let key: AnswerKey = from_json(&row.try_get::<String, _>("answer_key").map_err(ser)?)?;

    let kind: QuestionKind = row
        .try_get::<String, _>("kind")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    if kind != key.kind() {
        return Err(StorageError::Serialization(format!(
            "question {id} is stored as {kind} but its key is {}",
            key.kind()
        )));
    }

    let difficulty: Difficulty = row
        .try_get::<String, _>("difficulty")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let is_active: bool = row.try_get("is_active").map_err(ser)?;

    Question::new(
        id,
        topic_ids,
        order_no,
        row.try_get::<String, _>("stem").map_err(ser)?,
        choices,
        key,
        row.try_get("explanation").map_err(ser)?,
        difficulty,
    )
    .map(|q| q.with_active(is_active))
    .map_err(ser)
}

pub(crate) fn map_item_snapshot(row: &SqliteRow) -> Result<Item, StorageError> {
    from_json(&row.try_get::<String, _>("snapshot").map_err(ser)?)
}

/// Rehydrates a session from a `sessions` row and its ordered items.
pub(crate) fn map_session_row(row: &SqliteRow, items: Vec<Item>) -> Result<Session, StorageError> {
    let owner_id = OwnerId::new(i64_to_u64("owner_id", row.try_get("owner_id").map_err(ser)?)?);
    let scope: Scope = row
        .try_get::<String, _>("scope_key")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let state: SessionState = row
        .try_get::<String, _>("state")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    Session::from_persisted(
        session_id(row, "id")?,
        owner_id,
        scope,
        state,
        items,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("submitted_at").map_err(ser)?,
        row.try_get("discarded_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<Answer, StorageError> {
    let item_id: ItemId = row
        .try_get::<String, _>("item_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let kind: QuestionKind = row
        .try_get::<String, _>("kind")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let raw: String = row.try_get("value").map_err(ser)?;
    let value = AnswerValue::parse(kind, &raw).map_err(ser)?;

    Ok(Answer::new(
        session_id(row, "session_id")?,
        item_id,
        value,
        row.try_get("saved_at").map_err(ser)?,
    ))
}

pub(crate) fn map_result_row(row: &SqliteRow) -> Result<AssessmentResult, StorageError> {
    let total_score = u8::try_from(row.try_get::<i64, _>("total_score").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("total_score out of range".into()))?;
    let ai_recommendation: Option<Recommendation> = row
        .try_get::<Option<String>, _>("ai_recommendation")
        .map_err(ser)?
        .as_deref()
        .map(from_json::<Recommendation>)
        .transpose()?;

    Ok(AssessmentResult {
        session_id: session_id(row, "session_id")?,
        total_score,
        raw_score: row.try_get("raw_score").map_err(ser)?,
        responses: from_json(&row.try_get::<String, _>("responses").map_err(ser)?)?,
        breakdown: from_json(&row.try_get::<String, _>("breakdown").map_err(ser)?)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        ai_summary: row.try_get("ai_summary").map_err(ser)?,
        ai_recommendation,
    })
}

pub(crate) fn map_history_row(row: &SqliteRow) -> Result<HistoryRow, StorageError> {
    let scope: Scope = row
        .try_get::<String, _>("scope_key")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let total_score = u8::try_from(row.try_get::<i64, _>("total_score").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("total_score out of range".into()))?;

    Ok(HistoryRow {
        session_id: session_id(row, "id")?,
        scope,
        started_at: row.try_get("created_at").map_err(ser)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        total_score,
        question_count: u32_from_i64(
            "question_count",
            row.try_get("question_count").map_err(ser)?,
        )?,
    })
}

pub(crate) fn topic_id_from_i64(v: i64) -> Result<TopicId, StorageError> {
    Ok(TopicId::new(i64_to_u64("topic_id", v)?))
}

fn score_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v)
        .ok()
        .filter(|score| *score <= 100)
        .ok_or_else(|| StorageError::Serialization(format!("{field} out of range: {v}")))
}

pub(crate) fn map_topic_quiz_row(row: &SqliteRow) -> Result<TopicQuizStats, StorageError> {
    Ok(TopicQuizStats {
        owner_id: OwnerId::new(i64_to_u64("owner_id", row.try_get("owner_id").map_err(ser)?)?),
        topic_id: topic_id_from_i64(row.try_get("topic_id").map_err(ser)?)?,
        attempt_count: u32_from_i64("attempt_count", row.try_get("attempt_count").map_err(ser)?)?,
        last_score: score_from_i64("last_score", row.try_get("last_score").map_err(ser)?)?,
        best_score: score_from_i64("best_score", row.try_get("best_score").map_err(ser)?)?,
        pass_threshold: score_from_i64(
            "pass_threshold",
            row.try_get("pass_threshold").map_err(ser)?,
        )?,
        passed: row.try_get("passed").map_err(ser)?,
        last_session_id: session_id(row, "last_session_id")?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}
