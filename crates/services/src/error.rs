//! Shared error types for the services crate.

use thiserror::Error;

use proctor_core::model::{AnswerError, ResultError, TestError, TestStatus};
use storage::repository::StorageError;

use crate::proctoring::SessionPhase;

/// Errors emitted by proctoring sessions and the loop service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("invalid test: {0}")]
    InvalidTest(#[from] TestError),

    #[error("cannot {operation} while the session is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("question index {index} is out of range (test has {total} questions)")]
    QuestionOutOfRange { index: usize, total: usize },

    #[error("invalid answer: {0}")]
    InvalidAnswer(#[from] AnswerError),

    #[error("test is not live (status: {status})")]
    NotLive { status: TestStatus },

    #[error("attempt is not complete")]
    NotComplete,

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to persist result: {0}")]
    Persistence(#[source] StorageError),
}

/// Errors emitted by `ResultSummaryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
