use assess_core::model::{Answer, SessionId};

use super::SqliteRepository;
use super::mapping::{conn, map_answer_row};
use crate::repository::{AnswerRepository, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn save_answer(&self, answer: &Answer) -> Result<(), StorageError> {
        // The SELECT guard makes the upsert a no-op unless the session is running.
        let saved = sqlx::query(
            r"
            INSERT INTO answers (session_id, item_id, kind, value, saved_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE EXISTS (
                SELECT 1 FROM sessions WHERE id = ?1 AND state = 'in_progress'
            )
            ON CONFLICT(session_id, item_id) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                saved_at = excluded.saved_at
            ",
        )
        .bind(answer.session_id.to_string())
        .bind(answer.item_id.to_string())
        .bind(answer.value.kind().as_str())
        .bind(answer.value.to_wire())
        .bind(answer.saved_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if saved.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn answers_for(&self, session_id: SessionId) -> Result<Vec<Answer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, item_id, kind, value, saved_at
            FROM answers
            WHERE session_id = ?1
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_answer_row).collect()
    }
}
