use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies pending schema versions in order.
///
/// Version 1 creates the `tests` and `attempt_results` tables with their indexes.
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

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS tests (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    status TEXT NOT NULL
                        CHECK (status IN ('draft', 'published', 'live', 'closed')),
                    time_limit_secs INTEGER CHECK (time_limit_secs IS NULL OR time_limit_secs > 0),
                    document TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempt_results (
                    id INTEGER PRIMARY KEY,
                    attempt_id TEXT NOT NULL UNIQUE,
                    test_id INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    total_questions INTEGER NOT NULL CHECK (total_questions >= 0),
                    marks_awarded INTEGER NOT NULL CHECK (marks_awarded >= 0),
                    total_marks INTEGER NOT NULL CHECK (total_marks >= 0),
                    violation_count INTEGER NOT NULL CHECK (violation_count >= 0),
                    started_at TEXT NOT NULL,
                    completed_at TEXT NOT NULL,
                    per_question TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempt_results_test_completed
                    ON attempt_results (test_id, completed_at);
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
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
