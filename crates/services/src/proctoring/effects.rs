use std::fmt;

use chrono::{DateTime, Utc};
use proctor_core::model::{CompletionReason, ViolationKind};
use serde::Serialize;

/// Identifier of a notice within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NoticeId(u64);

impl NoticeId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NoticeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Below the threshold. Dismissed by timeout or acknowledgment.
    Warning,
    /// Threshold reached. Stays up until the attempt completes.
    Final,
}

/// A user-visible warning raised by a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub id: NoticeId,
    pub kind: NoticeKind,
    pub message: String,
    pub violation: ViolationKind,
    pub count: u32,
    pub max: u32,
    pub shown_at: DateTime<Utc>,
    /// `None` when the notice waits for acknowledgment or for completion.
    pub dismiss_at: Option<DateTime<Utc>>,
}

impl Notice {
    pub(crate) fn warning(
        id: NoticeId,
        violation: ViolationKind,
        count: u32,
        max: u32,
        shown_at: DateTime<Utc>,
        dismiss_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            kind: NoticeKind::Warning,
            message: format!("Warning {count}/{max}: {}", violation.reason()),
            violation,
            count,
            max,
            shown_at,
            dismiss_at,
        }
    }

    pub(crate) fn final_notice(
        id: NoticeId,
        violation: ViolationKind,
        count: u32,
        max: u32,
        shown_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: NoticeKind::Final,
            message: format!(
                "{}. Maximum warnings reached ({count}/{max}); the test will be submitted automatically.",
                violation.reason()
            ),
            violation,
            count,
            max,
            shown_at,
            dismiss_at: None,
        }
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.kind == NoticeKind::Final
    }
}

/// Side effect requested by the session. Drained with `take_effects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SessionEffect {
    RequestFullscreen,
    ShowNotice(Notice),
    DismissNotice { id: NoticeId },
    Completed { reason: CompletionReason },
}
