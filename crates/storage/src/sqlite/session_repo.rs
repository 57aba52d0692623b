use assess_core::model::{
    AiFeedback, AssessmentResult, OwnerId, Scope, Session, SessionId, TopicId, TopicQuizStats,
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, map_history_row, map_item_snapshot, map_result_row, map_session_row,
    map_topic_quiz_row, ser, to_json,
};
use crate::repository::{HistoryPage, SessionRepository, StorageError};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn fetch_topic_quiz(
    db: &mut SqliteConnection,
    owner: i64,
    topic: i64,
) -> Result<Option<TopicQuizStats>, StorageError> {
    let row = sqlx::query(
        r"
        SELECT
            owner_id, topic_id, attempt_count, last_score, best_score,
            pass_threshold, passed, last_session_id, updated_at
        FROM topic_quiz_stats
        WHERE owner_id = ?1 AND topic_id = ?2
        ",
    )
    .bind(owner)
    .bind(topic)
    .fetch_optional(db)
    .await
    .map_err(conn)?;

    row.as_ref().map(map_topic_quiz_row).transpose()
}

/// Folds a submitted topic quiz into the owner's stats, inside the caller's transaction.
async fn record_topic_quiz(
    db: &mut SqliteConnection,
    owner_id: OwnerId,
    topic_id: TopicId,
    result: &AssessmentResult,
    pass_threshold: u8,
) -> Result<TopicQuizStats, StorageError> {
    let owner = id_i64("owner_id", owner_id.value())?;
    let topic = id_i64("topic_id", topic_id.value())?;
    let previous = fetch_topic_quiz(&mut *db, owner, topic).await?;
    let stats =
        TopicQuizStats::record(previous.as_ref(), owner_id, topic_id, result, pass_threshold);

    sqlx::query(
        r"
        INSERT INTO topic_quiz_stats (
            owner_id, topic_id, attempt_count, last_score, best_score,
            pass_threshold, passed, last_session_id, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(owner_id, topic_id) DO UPDATE SET
            attempt_count = excluded.attempt_count,
            last_score = excluded.last_score,
            best_score = excluded.best_score,
            pass_threshold = excluded.pass_threshold,
            passed = excluded.passed,
            last_session_id = excluded.last_session_id,
            updated_at = excluded.updated_at
        ",
    )
    .bind(owner)
    .bind(topic)
    .bind(i64::from(stats.attempt_count))
    .bind(i64::from(stats.last_score))
    .bind(i64::from(stats.best_score))
    .bind(i64::from(stats.pass_threshold))
    .bind(stats.passed)
    .bind(stats.last_session_id.to_string())
    .bind(stats.updated_at)
    .execute(&mut *db)
    .await
    .map_err(conn)?;

    Ok(stats)
}

impl SqliteRepository {
    async fn load_session(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
        let id: String = sqlx::Row::try_get(row, "id").map_err(ser)?;
        let item_rows = sqlx::query(
            r"
            SELECT snapshot
            FROM session_items
            WHERE session_id = ?1
            ORDER BY order_no ASC
            ",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let items = item_rows
            .iter()
            .map(map_item_snapshot)
            .collect::<Result<Vec<_>, _>>()?;
        map_session_row(row, items)
    }

    /// Reports why a conditional update on `id` touched no rows.
    async fn missing_or_conflict(&self, id: &str) -> StorageError {
        let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        match exists {
            Ok(Some(_)) => StorageError::Conflict,
            Ok(None) => StorageError::NotFound,
            Err(e) => conn(e),
        }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        if session.state().is_terminal() {
            return Err(StorageError::Conflict);
        }
        let id = session.id().to_string();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO sessions (id, owner_id, scope_key, state, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id.as_str())
        .bind(id_i64("owner_id", session.owner_id().value())?)
        .bind(session.scope().key())
        .bind(session.state().as_str())
        .bind(session.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;

        for item in session.items() {
            sqlx::query(
                r"
                INSERT INTO session_items (session_id, order_no, item_id, snapshot)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id.as_str())
            .bind(i64::from(item.order_no))
            .bind(item.id.to_string())
            .bind(to_json(item)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, scope_key, state, created_at, submitted_at, discarded_at
            FROM sessions
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        self.load_session(&row).await
    }

    async fn find_open(
        &self,
        owner_id: OwnerId,
        scope: Scope,
    ) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, scope_key, state, created_at, submitted_at, discarded_at
            FROM sessions
            WHERE owner_id = ?1 AND scope_key = ?2 AND state IN ('pending', 'in_progress')
            ",
        )
        .bind(id_i64("owner_id", owner_id.value())?)
        .bind(scope.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => Ok(Some(self.load_session(&row).await?)),
            None => Ok(None),
        }
    }

    async fn complete_session(
        &self,
        id: SessionId,
        result: &AssessmentResult,
        pass_threshold: u8,
    ) -> Result<Option<TopicQuizStats>, StorageError> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let updated = sqlx::query(
            r"
            UPDATE sessions
            SET state = 'submitted', submitted_at = ?2
            WHERE id = ?1 AND state = 'in_progress'
            ",
        )
        .bind(id.as_str())
        .bind(result.submitted_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            drop(tx);
            return Err(self.missing_or_conflict(&id).await);
        }

        let recommendation = result
            .ai_recommendation
            .as_ref()
            .map(to_json)
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO results (
                session_id, total_score, raw_score, responses, breakdown,
                submitted_at, ai_summary, ai_recommendation
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id.as_str())
        .bind(i64::from(result.total_score))
        .bind(result.raw_score)
        .bind(to_json(&result.responses)?)
        .bind(to_json(&result.breakdown)?)
        .bind(result.submitted_at)
        .bind(result.ai_summary.as_deref())
        .bind(recommendation)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let owner_row = sqlx::query("SELECT owner_id, scope_key FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let scope: Scope = owner_row
            .try_get::<String, _>("scope_key")
            .map_err(ser)?
            .parse()
            .map_err(ser)?;
        let stats = match scope {
            Scope::Topic(topic_id) => {
                let owner: i64 = owner_row.try_get("owner_id").map_err(ser)?;
                let owner_id = OwnerId::new(u64::try_from(owner).map_err(ser)?);
                let stats =
                    record_topic_quiz(&mut *tx, owner_id, topic_id, result, pass_threshold)
                        .await?;
                Some(stats)
            }
            Scope::Global => None,
        };

        tx.commit().await.map_err(conn)?;
        Ok(stats)
    }

    async fn discard_session(&self, id: SessionId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let id = id.to_string();
        let updated = sqlx::query(
            r"
            UPDATE sessions
            SET state = 'discarded', discarded_at = ?2
            WHERE id = ?1 AND state IN ('pending', 'in_progress')
            ",
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            return Err(self.missing_or_conflict(&id).await);
        }
        Ok(())
    }

    async fn get_result(&self, id: SessionId) -> Result<AssessmentResult, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                session_id, total_score, raw_score, responses, breakdown,
                submitted_at, ai_summary, ai_recommendation
            FROM results
            WHERE session_id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_result_row(&row)
    }

    async fn attach_feedback(
        &self,
        id: SessionId,
        feedback: &AiFeedback,
    ) -> Result<(), StorageError> {
        let updated = sqlx::query(
            r"
            UPDATE results
            SET ai_summary = ?2, ai_recommendation = ?3
            WHERE session_id = ?1
            ",
        )
        .bind(id.to_string())
        .bind(feedback.summary.as_str())
        .bind(to_json(&feedback.recommendation)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_submitted(
        &self,
        owner_id: OwnerId,
        limit: u32,
        offset: u64,
    ) -> Result<HistoryPage, StorageError> {
        let owner = id_i64("owner_id", owner_id.value())?;

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM sessions s
            JOIN results r ON r.session_id = s.id
            WHERE s.owner_id = ?1 AND s.state = 'submitted'
            ",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let rows = sqlx::query(
            r"
            SELECT
                s.id, s.scope_key, s.created_at, r.submitted_at, r.total_score,
                (SELECT COUNT(*) FROM session_items i WHERE i.session_id = s.id)
                    AS question_count
            FROM sessions s
            JOIN results r ON r.session_id = s.id
            WHERE s.owner_id = ?1 AND s.state = 'submitted'
            ORDER BY r.submitted_at DESC, s.id DESC
            LIMIT ?2 OFFSET ?3
            ",
        )
        .bind(owner)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).map_err(ser)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let rows = rows
            .iter()
            .map(map_history_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HistoryPage {
            rows,
            total: u64::try_from(total).map_err(ser)?,
        })
    }

    async fn topic_quiz_stats(
        &self,
        owner_id: OwnerId,
        topic_id: TopicId,
    ) -> Result<Option<TopicQuizStats>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        fetch_topic_quiz(
            &mut *db,
            id_i64("owner_id", owner_id.value())?,
            id_i64("topic_id", topic_id.value())?,
        )
        .await
    }
}
