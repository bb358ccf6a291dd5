use chrono::{DateTime, Utc};
use std::sync::Arc;

use proctor_core::model::{AttemptId, AttemptResult, CompletionReason, TestId};
use storage::repository::{ResultRepository, ResultRow};

use crate::Clock;
use crate::error::ResultServiceError;

/// Storage identifier for a persisted attempt result.
pub type ResultId = i64;

/// Presentation-agnostic list item for a stored result.
///
/// Timestamps are left unformatted; the caller decides how to render them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultListItem {
    pub id: ResultId,
    pub attempt_id: AttemptId,
    pub reason: CompletionReason,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: i64,

    pub score: u32,
    pub correct: u32,
    pub total: u32,
    pub marks_awarded: u32,
    pub total_marks: u32,
    pub violations: u32,
}

impl ResultListItem {
    #[must_use]
    pub fn from_row(row: &ResultRow) -> Self {
        Self::from_result(row.id, &row.result)
    }

    #[must_use]
    pub fn from_result(id: ResultId, result: &AttemptResult) -> Self {
        Self {
            id,
            attempt_id: result.attempt_id(),
            reason: result.reason(),
            completed_at: result.completed_at(),
            duration_secs: (result.completed_at() - result.started_at()).num_seconds(),
            score: result.score(),
            correct: result.correct_count(),
            total: result.total_questions(),
            marks_awarded: result.marks_awarded(),
            total_marks: result.total_marks(),
            violations: result.violation_count(),
        }
    }
}

/// Read-side facade over stored results.
#[derive(Clone)]
pub struct ResultSummaryService {
    clock: Clock,
    results: Arc<dyn ResultRepository>,
}

impl ResultSummaryService {
    #[must_use]
    pub fn new(clock: Clock, results: Arc<dyn ResultRepository>) -> Self {
        Self { clock, results }
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(
            clock,
            Arc::new(storage::repository::InMemoryRepository::new()),
        )
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Most recent results for a test, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ResultServiceError::Storage` on repository failures.
    pub async fn list_results(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<ResultListItem>, ResultServiceError> {
        let rows = self.results.list_results(test_id, limit).await?;
        Ok(rows.iter().map(ResultListItem::from_row).collect())
    }

    /// Load the full result, including per-question outcomes.
    ///
    /// # Errors
    ///
    /// Returns `ResultServiceError::Storage` if the result is missing or the
    /// repository fails.
    pub async fn get_result(&self, id: ResultId) -> Result<AttemptResult, ResultServiceError> {
        Ok(self.results.get_result(id).await?)
    }
}
