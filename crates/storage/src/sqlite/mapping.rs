use proctor_core::model::{AttemptId, AttemptResult, CompletionReason, QuestionOutcome, TestId};
use sqlx::Row;

use crate::repository::{ResultRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn test_id_from_i64(v: i64) -> Result<TestId, StorageError> {
    u64::try_from(v)
        .map(TestId::new)
        .map_err(|_| StorageError::Serialization("test_id sign overflow".into()))
}

pub(crate) fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<AttemptResult, StorageError> {
    let attempt_raw: String = row.try_get("attempt_id").map_err(ser)?;
    let attempt_id: AttemptId = attempt_raw.parse().map_err(ser)?;
    let test_id = test_id_from_i64(row.try_get::<i64, _>("test_id").map_err(ser)?)?;
    let reason: CompletionReason = row
        .try_get::<String, _>("reason")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    let per_question_raw: String = row.try_get("per_question").map_err(ser)?;
    let per_question: Vec<QuestionOutcome> =
        serde_json::from_str(&per_question_raw).map_err(ser)?;

    let count = |field: &'static str| -> Result<u32, StorageError> {
        u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
    };

    AttemptResult::from_persisted(
        attempt_id,
        test_id,
        reason,
        count("score")?,
        count("correct_count")?,
        count("total_questions")?,
        count("marks_awarded")?,
        count("total_marks")?,
        count("violation_count")?,
        per_question,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_result_row_with_id(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    Ok(ResultRow::new(id, map_result_row(row)?))
}
