mod effects;
mod progress;
mod session;
mod timers;
mod view;
mod workflow;

// Public API of the proctoring subsystem.
pub use crate::error::SessionError;
pub use effects::{Notice, NoticeId, NoticeKind, SessionEffect};
pub use progress::SessionProgress;
pub use session::{ProctoringSession, SessionPhase};
pub use view::{ResultId, ResultListItem, ResultSummaryService};
pub use workflow::ProctorLoopService;
