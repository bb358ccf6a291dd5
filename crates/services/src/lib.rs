#![forbid(unsafe_code)]

pub mod error;
pub mod proctoring;

pub use proctor_core::Clock;

pub use error::{ResultServiceError, SessionError};

pub use proctoring::{
    Notice, NoticeId, NoticeKind, ProctorLoopService, ProctoringSession, ResultId,
    ResultListItem, ResultSummaryService, SessionEffect, SessionPhase, SessionProgress,
};
