mod answer;
mod ids;
mod question;
mod result;
mod settings;
mod violation;

pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId, TestId};

pub use answer::{AnswerError, AnswerSelection};
pub use question::{
    AnswerOption, MAX_OPTIONS, MIN_OPTIONS, Question, QuestionDraft, QuestionError, QuestionKind,
};
pub use result::{AttemptResult, CompletionReason, QuestionOutcome, ResultError};
pub use settings::{DEFAULT_TIME_LIMIT_SECS, MAX_WARNINGS, ProctorSettings, SettingsError};
pub use test::{TestDefinition, TestError, TestStatus};
pub use violation::{Violation, ViolationKind};
