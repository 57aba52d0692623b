use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            order_no INTEGER NOT NULL CHECK (order_no >= 0),
            kind TEXT NOT NULL CHECK (kind IN ('single', 'multi', 'short')),
            stem TEXT NOT NULL,
            choices TEXT NOT NULL,
            answer_key TEXT NOT NULL,
            explanation TEXT,
            difficulty TEXT NOT NULL
                CHECK (difficulty IN ('beginner', 'intermediate', 'advanced')),
            is_active INTEGER NOT NULL DEFAULT 1
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_topics (
            question_id INTEGER NOT NULL,
            topic_id INTEGER NOT NULL,
            PRIMARY KEY (question_id, topic_id),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            scope_key TEXT NOT NULL,
            state TEXT NOT NULL
                CHECK (state IN ('pending', 'in_progress', 'submitted', 'discarded')),
            created_at TEXT NOT NULL,
            submitted_at TEXT,
            discarded_at TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS session_items (
            session_id TEXT NOT NULL,
            order_no INTEGER NOT NULL CHECK (order_no >= 1),
            item_id TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            PRIMARY KEY (session_id, order_no),
            UNIQUE (session_id, item_id),
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS answers (
            session_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            PRIMARY KEY (session_id, item_id),
            FOREIGN KEY (session_id, item_id)
                REFERENCES session_items(session_id, item_id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS results (
            session_id TEXT PRIMARY KEY,
            total_score INTEGER NOT NULL CHECK (total_score BETWEEN 0 AND 100),
            raw_score REAL NOT NULL,
            responses TEXT NOT NULL,
            breakdown TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            ai_summary TEXT,
            ai_recommendation TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );
    ",
    // At most one unfinished session per owner and scope.
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_open_slot
            ON sessions(owner_id, scope_key)
            WHERE state IN ('pending', 'in_progress');
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_owner_submitted
            ON sessions(owner_id, state, submitted_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_question_topics_topic
            ON question_topics(topic_id, question_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_active_difficulty
            ON questions(is_active, difficulty);
    ",
];

const SCHEMA_V2: &[&str] = &[r"
        CREATE TABLE IF NOT EXISTS topic_quiz_stats (
            owner_id INTEGER NOT NULL,
            topic_id INTEGER NOT NULL,
            attempt_count INTEGER NOT NULL CHECK (attempt_count >= 1),
            last_score INTEGER NOT NULL CHECK (last_score BETWEEN 0 AND 100),
            best_score INTEGER NOT NULL CHECK (best_score BETWEEN 0 AND 100),
            pass_threshold INTEGER NOT NULL CHECK (pass_threshold BETWEEN 0 AND 100),
            passed INTEGER NOT NULL,
            last_session_id TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (owner_id, topic_id),
            FOREIGN KEY (last_session_id) REFERENCES sessions(id)
        );
    "];

/// Runs versioned migrations. Each version is applied in its own transaction
/// and recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    let versions: [(i64, &[&str]); 2] = [(1, SCHEMA_V1), (2, SCHEMA_V2)];
    for (version, statements) in versions {
        if is_applied(pool, version).await? {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in statements {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(version, "applied schema migration");
    }

    Ok(())
}
