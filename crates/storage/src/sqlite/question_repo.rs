use std::collections::HashMap;

use assess_core::model::{DifficultyFilter, Question, QuestionId, TopicId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_question_row, ser, to_json, topic_id_from_i64};
use crate::repository::{QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str =
    "q.id, q.order_no, q.kind, q.stem, q.choices, q.answer_key, q.explanation, q.difficulty, q.is_active";

fn difficulty_param(filter: DifficultyFilter) -> Option<&'static str> {
    match filter {
        DifficultyFilter::Mixed => None,
        DifficultyFilter::Only(d) => Some(d.as_str()),
    }
}

impl SqliteRepository {
    async fn topics_by_question(
        &self,
        question_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<TopicId>>, StorageError> {
        if question_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut sql = String::from(
            r"
            SELECT question_id, topic_id
            FROM question_topics
            WHERE question_id IN (
            ",
        );
        for i in 0..question_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\n ORDER BY question_id, topic_id");

        let mut query = sqlx::query(&sql);
        for id in question_ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out: HashMap<i64, Vec<TopicId>> = HashMap::new();
        for row in rows {
            let question_id: i64 = row.try_get("question_id").map_err(ser)?;
            let topic = topic_id_from_i64(row.try_get("topic_id").map_err(ser)?)?;
            out.entry(question_id).or_default().push(topic);
        }
        Ok(out)
    }

    async fn hydrate_questions(&self, rows: Vec<SqliteRow>) -> Result<Vec<Question>, StorageError> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(ser))
            .collect::<Result<Vec<_>, _>>()?;
        let mut topics = self.topics_by_question(&ids).await?;

        let mut out = Vec::with_capacity(rows.len());
        for (row, id) in rows.iter().zip(ids) {
            let topic_ids = topics.remove(&id).unwrap_or_default();
            out.push(map_question_row(row, topic_ids)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let id = id_i64("question_id", question.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO questions (
                id, order_no, kind, stem, choices, answer_key, explanation, difficulty, is_active
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                order_no = excluded.order_no,
                kind = excluded.kind,
                stem = excluded.stem,
                choices = excluded.choices,
                answer_key = excluded.answer_key,
                explanation = excluded.explanation,
                difficulty = excluded.difficulty,
                is_active = excluded.is_active
            ",
        )
        .bind(id)
        .bind(i64::from(question.order_no()))
        .bind(question.kind().as_str())
        .bind(question.stem())
        .bind(to_json(&question.choices())?)
        .bind(to_json(question.key())?)
        .bind(question.explanation())
        .bind(question.difficulty().as_str())
        .bind(question.is_active())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM question_topics WHERE question_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for topic in question.topic_ids() {
            sqlx::query("INSERT INTO question_topics (question_id, topic_id) VALUES (?1, ?2)")
                .bind(id)
                .bind(id_i64("topic_id", topic.value())?)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        self.hydrate_questions(vec![row])
            .await?
            .pop()
            .ok_or(StorageError::NotFound)
    }

    async fn active_for_topic(&self, topic_id: TopicId) -> Result<Vec<Question>, StorageError> {
        let sql = format!(
            r"
            SELECT {QUESTION_COLUMNS}
            FROM questions q
            JOIN question_topics t ON t.question_id = q.id
            WHERE t.topic_id = ?1 AND q.is_active = 1
            ORDER BY q.order_no ASC, q.id ASC
            "
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("topic_id", topic_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        self.hydrate_questions(rows).await
    }

    async fn active_pool(&self, filter: DifficultyFilter) -> Result<Vec<Question>, StorageError> {
        let sql = format!(
            r"
            SELECT {QUESTION_COLUMNS}
            FROM questions q
            WHERE q.is_active = 1 AND (?1 IS NULL OR q.difficulty = ?1)
            ORDER BY q.id ASC
            "
        );
        let rows = sqlx::query(&sql)
            .bind(difficulty_param(filter))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        self.hydrate_questions(rows).await
    }

    async fn count_active(&self, filter: DifficultyFilter) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM questions
            WHERE is_active = 1 AND (?1 IS NULL OR difficulty = ?1)
            ",
        )
        .bind(difficulty_param(filter))
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u64::try_from(count).map_err(ser)
    }
}
