use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (courses, learning nodes, per-user progress,
/// progress summaries, unlock logs, and indexes).
#[allow(clippy::too_many_lines)]
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

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS courses (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS learning_nodes (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    title TEXT NOT NULL,
                    node_type TEXT NOT NULL,
                    is_optional INTEGER NOT NULL CHECK (is_optional IN (0, 1)),
                    prerequisites TEXT NOT NULL,
                    required_score REAL,
                    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS node_progress (
                    user_id TEXT NOT NULL,
                    node_id INTEGER NOT NULL,
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    score REAL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, node_id),
                    FOREIGN KEY (node_id) REFERENCES learning_nodes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS course_progress_summaries (
                    user_id TEXT NOT NULL,
                    course_id INTEGER NOT NULL,
                    total_nodes INTEGER NOT NULL CHECK (total_nodes >= 0),
                    completed_nodes INTEGER NOT NULL CHECK (completed_nodes >= 0),
                    progress_percent REAL NOT NULL,
                    can_take_final_exam INTEGER NOT NULL CHECK (can_take_final_exam IN (0, 1)),
                    final_exam_passed INTEGER NOT NULL CHECK (final_exam_passed IN (0, 1)),
                    certificate_issued INTEGER NOT NULL CHECK (certificate_issued IN (0, 1)),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, course_id),
                    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS unlock_logs (
                    id INTEGER PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    course_id INTEGER NOT NULL,
                    node_id INTEGER NOT NULL,
                    granted INTEGER NOT NULL CHECK (granted IN (0, 1)),
                    reason TEXT,
                    checked_at TEXT NOT NULL,
                    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE,
                    FOREIGN KEY (node_id) REFERENCES learning_nodes(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_learning_nodes_course_position
                    ON learning_nodes (course_id, position, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_node_progress_user
                    ON node_progress (user_id, node_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_unlock_logs_user_course_checked
                    ON unlock_logs (user_id, course_id, checked_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
