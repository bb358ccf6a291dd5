use thiserror::Error;

use crate::model::{AnswerError, QuestionError, ResultError, SettingsError, TestError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Test(#[from] TestError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
