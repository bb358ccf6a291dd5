use proctor_core::model::{AttemptResult, TestId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_result_row, map_result_row_with_id, ser};
use crate::repository::{ResultRepository, ResultRow, StorageError};

fn insert_error(e: sqlx::Error) -> StorageError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => conn(e),
    }
}

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(&self, result: &AttemptResult) -> Result<i64, StorageError> {
        let test_id = id_i64("test_id", result.test_id().value())?;
        let per_question = serde_json::to_string(result.per_question()).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO attempt_results (
                    attempt_id, test_id, reason, score, correct_count, total_questions,
                    marks_awarded, total_marks, violation_count, started_at, completed_at,
                    per_question
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(result.attempt_id().to_string())
        .bind(test_id)
        .bind(result.reason().as_str())
        .bind(i64::from(result.score()))
        .bind(i64::from(result.correct_count()))
        .bind(i64::from(result.total_questions()))
        .bind(i64::from(result.marks_awarded()))
        .bind(i64::from(result.total_marks()))
        .bind(i64::from(result.violation_count()))
        .bind(result.started_at())
        .bind(result.completed_at())
        .bind(per_question)
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    attempt_id, test_id, reason, score, correct_count, total_questions,
                    marks_awarded, total_marks, violation_count, started_at, completed_at,
                    per_question
                FROM attempt_results
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_result_row(&row)
    }

    async fn list_results(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, attempt_id, test_id, reason, score, correct_count, total_questions,
                    marks_awarded, total_marks, violation_count, started_at, completed_at,
                    per_question
                FROM attempt_results
                WHERE test_id = ?1
                ORDER BY completed_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(id_i64("test_id", test_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_result_row_with_id).collect()
    }
}
