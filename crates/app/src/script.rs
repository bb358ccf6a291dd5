use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use proctor_core::model::{AnswerSelection, QuestionKind};
use services::{NoticeId, ProctoringSession, SessionEffect, SessionError};

/// One recorded host signal, `at` seconds after the replay base time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptEvent {
    pub at: u32,
    #[serde(flatten)]
    pub signal: Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    Start,
    Tick {
        #[serde(default = "one_second")]
        elapsed: u32,
    },
    Face {
        present: bool,
    },
    Visibility {
        hidden: bool,
    },
    Fullscreen {
        active: bool,
    },
    FullscreenUnavailable,
    Unload,
    /// An empty `selected` list clears the answer.
    Answer {
        question: usize,
        #[serde(default)]
        selected: Vec<usize>,
    },
    Navigate {
        question: usize,
    },
    Acknowledge {
        notice: u64,
    },
    Submit,
    Poll,
}

fn one_second() -> u32 {
    1
}

/// Effect drained after an event, tagged with the event offset.
#[derive(Debug, Serialize)]
pub struct EffectLine<'a> {
    pub at: u32,
    #[serde(flatten)]
    pub effect: &'a SessionEffect,
}

/// Parse a script and order it by offset. Events sharing an offset keep
/// their file order.
///
/// # Errors
///
/// Returns the JSON error for malformed scripts.
pub fn parse_script(raw: &str) -> Result<Vec<ScriptEvent>, serde_json::Error> {
    let mut events: Vec<ScriptEvent> = serde_json::from_str(raw)?;
    events.sort_by_key(|event| event.at);
    Ok(events)
}

#[must_use]
pub fn event_time(base: DateTime<Utc>, event: &ScriptEvent) -> DateTime<Utc> {
    base + Duration::seconds(i64::from(event.at))
}

/// Feed one event into the session at its own timestamp.
///
/// # Errors
///
/// Propagates the session's error for the signal.
pub fn apply(
    session: &mut ProctoringSession,
    event: &ScriptEvent,
    base: DateTime<Utc>,
) -> Result<(), SessionError> {
    let now = event_time(base, event);
    match &event.signal {
        Signal::Start => session.start(now),
        Signal::Tick { elapsed } => session.tick(*elapsed, now),
        Signal::Face { present } => session.report_face_presence(*present, now),
        Signal::Visibility { hidden } => session.report_visibility_change(*hidden, now),
        Signal::Fullscreen { active } => session.report_fullscreen_change(*active, now),
        Signal::FullscreenUnavailable => session.report_fullscreen_unavailable(now),
        Signal::Unload => session.report_page_unload(now),
        Signal::Answer { question, selected } => {
            session.poll(now)?;
            if selected.is_empty() {
                return session.clear_answer(*question);
            }
            let single = session
                .test()
                .question(*question)
                .is_some_and(|q| q.kind() == QuestionKind::SingleSelect);
            let selection = match selected.as_slice() {
                [index] if single => AnswerSelection::Single(*index),
                _ => AnswerSelection::multiple(selected.iter().copied()),
            };
            session.select_answer(*question, selection)
        }
        Signal::Navigate { question } => {
            session.poll(now)?;
            session.navigate_to(*question)
        }
        Signal::Acknowledge { notice } => {
            session.poll(now)?;
            if !session.acknowledge_notice(NoticeId::new(*notice)) {
                tracing::debug!(notice, "acknowledge ignored");
            }
            Ok(())
        }
        Signal::Submit => session.submit(now),
        Signal::Poll => session.poll(now),
    }
}
