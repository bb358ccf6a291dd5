use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerSelection;
use crate::model::ids::{AttemptId, QuestionId, TestId};
use crate::model::test::TestDefinition;
use crate::scoring;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("correct count ({correct}) exceeds total questions ({total})")]
    CountMismatch { correct: u32, total: u32 },

    #[error("score must be between 0 and 100, got {0}")]
    InvalidScore(u32),

    #[error("unknown completion reason: {0}")]
    UnknownReason(String),
}

/// Why an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    ManualSubmit,
    TimeExpired,
    PolicyViolation,
}

impl CompletionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionReason::ManualSubmit => "manual_submit",
            CompletionReason::TimeExpired => "time_expired",
            CompletionReason::PolicyViolation => "policy_violation",
        }
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionReason {
    type Err = ResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_submit" => Ok(CompletionReason::ManualSubmit),
            "time_expired" => Ok(CompletionReason::TimeExpired),
            "policy_violation" => Ok(CompletionReason::PolicyViolation),
            other => Err(ResultError::UnknownReason(other.to_owned())),
        }
    }
}

/// Graded answer for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub index: usize,
    pub selection: Option<AnswerSelection>,
    pub correct: bool,
    pub marks_awarded: u32,
}

/// Write-once record of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    attempt_id: AttemptId,
    test_id: TestId,
    reason: CompletionReason,
    score: u32,
    correct_count: u32,
    total_questions: u32,
    marks_awarded: u32,
    total_marks: u32,
    violation_count: u32,
    per_question: Vec<QuestionOutcome>,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
}

impl AttemptResult {
    /// Grade the recorded answers and build the result.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::InvalidTimeRange` if `completed_at` is before `started_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn grade(
        attempt_id: AttemptId,
        test: &TestDefinition,
        answers: &BTreeMap<usize, AnswerSelection>,
        reason: CompletionReason,
        violation_count: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        if completed_at < started_at {
            return Err(ResultError::InvalidTimeRange);
        }
        let grading = scoring::grade(test, answers);

        Ok(Self {
            attempt_id,
            test_id: test.id(),
            reason,
            score: grading.score,
            correct_count: grading.correct_count,
            total_questions: grading.total_questions,
            marks_awarded: grading.marks_awarded,
            total_marks: grading.total_marks,
            violation_count,
            per_question: grading.outcomes,
            started_at,
            completed_at,
        })
    }

    /// Rehydrate a result from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if counts, score or timestamps are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        attempt_id: AttemptId,
        test_id: TestId,
        reason: CompletionReason,
        score: u32,
        correct_count: u32,
        total_questions: u32,
        marks_awarded: u32,
        total_marks: u32,
        violation_count: u32,
        per_question: Vec<QuestionOutcome>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        if completed_at < started_at {
            return Err(ResultError::InvalidTimeRange);
        }
        if correct_count > total_questions {
            return Err(ResultError::CountMismatch {
                correct: correct_count,
                total: total_questions,
            });
        }
        if score > 100 {
            return Err(ResultError::InvalidScore(score));
        }

        Ok(Self {
            attempt_id,
            test_id,
            reason,
            score,
            correct_count,
            total_questions,
            marks_awarded,
            total_marks,
            violation_count,
            per_question,
            started_at,
            completed_at,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn reason(&self) -> CompletionReason {
        self.reason
    }

    /// Percentage of questions answered correctly, 0-100.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn marks_awarded(&self) -> u32 {
        self.marks_awarded
    }

    #[must_use]
    pub fn total_marks(&self) -> u32 {
        self.total_marks
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn per_question(&self) -> &[QuestionOutcome] {
        &self.per_question
    }

    /// Number of questions with a recorded answer.
    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.per_question
            .iter()
            .filter(|o| o.selection.is_some())
            .count()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn reason_round_trips_through_str() {
        for reason in [
            CompletionReason::ManualSubmit,
            CompletionReason::TimeExpired,
            CompletionReason::PolicyViolation,
        ] {
            assert_eq!(reason.as_str().parse::<CompletionReason>().unwrap(), reason);
        }
        assert!("crashed".parse::<CompletionReason>().is_err());
    }

    #[test]
    fn persisted_result_is_checked() {
        let now = fixed_now();
        let err = AttemptResult::from_persisted(
            AttemptId::generate(),
            TestId::new(1),
            CompletionReason::ManualSubmit,
            50,
            3,
            2,
            0,
            2,
            0,
            Vec::new(),
            now,
            now,
        )
        .unwrap_err();
        assert_eq!(err, ResultError::CountMismatch { correct: 3, total: 2 });

        let err = AttemptResult::from_persisted(
            AttemptId::generate(),
            TestId::new(1),
            CompletionReason::ManualSubmit,
            50,
            1,
            2,
            1,
            2,
            0,
            Vec::new(),
            now,
            now - chrono::Duration::seconds(1),
        )
        .unwrap_err();
        assert_eq!(err, ResultError::InvalidTimeRange);
    }
}
