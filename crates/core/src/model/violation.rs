use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Integrity signal that counts toward the escalation threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Face absent for longer than the grace window.
    FaceNotDetected,
    /// Page became hidden (tab or window switch).
    TabSwitch,
    /// Fullscreen was left while the attempt was running.
    FullscreenExited,
    /// Fullscreen could not be obtained when the attempt started.
    FullscreenUnavailable,
    /// The page attempted to unload mid-attempt.
    PageUnload,
    /// Host-defined signal.
    Other(String),
}

impl ViolationKind {
    /// Human-readable reason shown in warning notices.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            ViolationKind::FaceNotDetected => "Face not detected",
            ViolationKind::TabSwitch => "Tab switching detected",
            ViolationKind::FullscreenExited => "Fullscreen exited",
            ViolationKind::FullscreenUnavailable => "Fullscreen not enabled",
            ViolationKind::PageUnload => "Leaving the test page",
            ViolationKind::Other(reason) => reason,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A recorded violation. `count` is the running total after this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub at: DateTime<Utc>,
    pub count: u32,
}
