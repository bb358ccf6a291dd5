use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use proctor_core::model::{
    AnswerSelection, AttemptId, AttemptResult, CompletionReason, ProctorSettings, Question,
    TestDefinition, Violation, ViolationKind,
};
use proctor_core::time::format_countdown;
use serde::Serialize;

use super::effects::{Notice, NoticeId, SessionEffect};
use super::progress::SessionProgress;
use super::timers::{Due, Timers};
use crate::error::SessionError;

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of an attempt. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    Running,
    Completed,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::NotStarted => "not started",
            SessionPhase::Running => "running",
            SessionPhase::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Supervises one timed attempt at a test.
///
/// The session is a synchronous state machine. Every signal carries the
/// caller's `now`; pending deadlines (face grace, notice dismissal and
/// auto-submit) fire at the start of the first signal or `poll` whose `now`
/// reaches them, in that order. Side effects for the host accumulate in an
/// outbox drained with `take_effects`.
///
/// Environmental signals (ticks, face samples, visibility, fullscreen,
/// unload) are ignored outside `Running`. User operations in the wrong phase
/// are ignored too, unless the settings are strict.
pub struct ProctoringSession {
    attempt_id: AttemptId,
    test: Arc<TestDefinition>,
    settings: ProctorSettings,
    phase: SessionPhase,

    current_question: usize,
    answers: BTreeMap<usize, AnswerSelection>,
    remaining_secs: u32,

    face_present: bool,
    face_episode_penalized: bool,
    last_face_loss_at: Option<DateTime<Utc>>,
    fullscreen_available: bool,

    violation_count: u32,
    violations: Vec<Violation>,

    timers: Timers,
    notice: Option<Notice>,
    next_notice_id: u64,
    effects: Vec<SessionEffect>,

    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<AttemptResult>,
    result_id: Option<i64>,
    persist_error: Option<String>,
}

impl ProctoringSession {
    /// Creates a session that has not started yet.
    #[must_use]
    pub fn new(test: Arc<TestDefinition>, settings: ProctorSettings) -> Self {
        Self {
            attempt_id: AttemptId::generate(),
            test,
            settings,
            phase: SessionPhase::NotStarted,
            current_question: 0,
            answers: BTreeMap::new(),
            remaining_secs: 0,
            face_present: false,
            face_episode_penalized: false,
            last_face_loss_at: None,
            fullscreen_available: true,
            violation_count: 0,
            violations: Vec::new(),
            timers: Timers::default(),
            notice: None,
            next_notice_id: 1,
            effects: Vec::new(),
            started_at: None,
            completed_at: None,
            result: None,
            result_id: None,
            persist_error: None,
        }
    }

    #[must_use]
    pub fn with_attempt_id(mut self, attempt_id: AttemptId) -> Self {
        self.attempt_id = attempt_id;
        self
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn test(&self) -> &TestDefinition {
        &self.test
    }

    #[must_use]
    pub fn settings(&self) -> &ProctorSettings {
        &self.settings
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    #[must_use]
    pub fn current_question(&self) -> usize {
        self.current_question
    }

    #[must_use]
    pub fn current(&self) -> Option<&Question> {
        self.test.question(self.current_question)
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<usize, AnswerSelection> {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, question_index: usize) -> Option<&AnswerSelection> {
        self.answers.get(&question_index)
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Remaining time as `HH:MM:SS`.
    #[must_use]
    pub fn countdown(&self) -> String {
        format_countdown(self.remaining_secs)
    }

    #[must_use]
    pub fn face_present(&self) -> bool {
        self.face_present
    }

    #[must_use]
    pub fn last_face_loss_at(&self) -> Option<DateTime<Utc>> {
        self.last_face_loss_at
    }

    /// False once the host reported that fullscreen could not be entered.
    #[must_use]
    pub fn fullscreen_available(&self) -> bool {
        self.fullscreen_available
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    #[must_use]
    pub fn active_notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn completion_reason(&self) -> Option<CompletionReason> {
        self.result.as_ref().map(AttemptResult::reason)
    }

    /// The graded result, available once completed.
    #[must_use]
    pub fn result(&self) -> Option<&AttemptResult> {
        self.result.as_ref()
    }

    /// Storage row id of the persisted result.
    #[must_use]
    pub fn result_id(&self) -> Option<i64> {
        self.result_id
    }

    /// Last persistence failure, cleared once the result is stored.
    #[must_use]
    pub fn persist_error(&self) -> Option<&str> {
        self.persist_error.as_deref()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.test.question_count(),
            answered: self.answers.len(),
            current: self.current_question,
            remaining_secs: self.remaining_secs,
            violations: self.violation_count,
            max_warnings: self.settings.max_warnings(),
            is_complete: self.is_complete(),
        }
    }

    /// Earliest pending deadline, so the host knows when to `poll`.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Drains the effect outbox.
    pub fn take_effects(&mut self) -> Vec<SessionEffect> {
        std::mem::take(&mut self.effects)
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Starts the attempt and the countdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if the session already started and
    /// `SessionError::InvalidTest` if the test has no questions.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.phase != SessionPhase::NotStarted {
            return Err(SessionError::InvalidState {
                operation: "start",
                phase: self.phase,
            });
        }
        self.test.ensure_attemptable()?;

        self.remaining_secs = self
            .test
            .time_limit_secs()
            .unwrap_or_else(|| self.settings.default_time_limit_secs());
        self.phase = SessionPhase::Running;
        self.started_at = Some(now);
        self.current_question = 0;
        self.effects.push(SessionEffect::RequestFullscreen);

        if !self.face_present {
            self.open_face_episode(now);
        }

        tracing::info!(
            test_id = %self.test.id(),
            attempt_id = %self.attempt_id,
            remaining_secs = self.remaining_secs,
            "attempt started"
        );
        Ok(())
    }

    /// Advances the countdown by `elapsed_secs`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn tick(&mut self, elapsed_secs: u32, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.fire_due(now)?;
        if !self.is_running() {
            return Ok(());
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(elapsed_secs);
        if self.remaining_secs == 0 {
            self.finish(CompletionReason::TimeExpired, now)?;
        }
        Ok(())
    }

    /// Fires any deadline that is due at `now`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.fire_due(now)
    }

    /// Ends the attempt. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` when called before `start` in
    /// strict mode.
    pub fn complete(
        &mut self,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.fire_due(now)?;
        match self.phase {
            SessionPhase::Completed => Ok(()),
            SessionPhase::NotStarted => self.reject("complete").map(|_| ()),
            SessionPhase::Running => self.finish(reason, now),
        }
    }

    /// Manual submission by the candidate.
    ///
    /// # Errors
    ///
    /// See [`ProctoringSession::complete`].
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.complete(CompletionReason::ManualSubmit, now)
    }

    // ─── Signals ──────────────────────────────────────────────────────────────

    /// Consumes one face-detector sample.
    ///
    /// Accepted before `start` so the host can gate its start button on a
    /// visible face. While running, a loss opens an episode and arms the grace
    /// window; a face seen before the deadline closes the episode with no penalty.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn report_face_presence(
        &mut self,
        present: bool,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.fire_due(now)?;
        match self.phase {
            SessionPhase::NotStarted => {
                self.face_present = present;
                return Ok(());
            }
            SessionPhase::Completed => return Ok(()),
            SessionPhase::Running => {}
        }

        let was_present = self.face_present;
        self.face_present = present;

        if present {
            self.timers.cancel_face_grace();
            self.face_episode_penalized = false;
        } else if was_present {
            self.open_face_episode(now);
        } else if !self.timers.face_grace_armed() && !self.face_episode_penalized {
            self.arm_face_grace(now);
        }
        Ok(())
    }

    /// The fullscreen request made at start failed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn report_fullscreen_unavailable(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.fire_due(now)?;
        if !self.is_running() {
            return Ok(());
        }

        self.fullscreen_available = false;
        if self.settings.penalize_fullscreen_refusal() {
            self.record_violation(ViolationKind::FullscreenUnavailable, now)?;
        }
        Ok(())
    }

    /// Page visibility changed. Every `hidden == true` report is a violation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn report_visibility_change(
        &mut self,
        hidden: bool,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.fire_due(now)?;
        if self.is_running() && hidden {
            self.record_violation(ViolationKind::TabSwitch, now)?;
        }
        Ok(())
    }

    /// Fullscreen state changed. Every exit is a violation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn report_fullscreen_change(
        &mut self,
        is_fullscreen: bool,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.fire_due(now)?;
        if !self.is_running() {
            return Ok(());
        }

        if is_fullscreen {
            self.fullscreen_available = true;
        } else {
            self.record_violation(ViolationKind::FullscreenExited, now)?;
        }
        Ok(())
    }

    /// The page is about to unload.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn report_page_unload(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.fire_due(now)?;
        if self.is_running() {
            self.record_violation(ViolationKind::PageUnload, now)?;
        }
        Ok(())
    }

    /// Records a violation and applies the escalation policy.
    ///
    /// Below `max_warnings` a warning notice is shown. Reaching it shows the
    /// final notice and completes the attempt after `auto_submit_delay_secs`.
    /// Violations during that delay are recorded but change nothing else.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Result` only if grading the completed attempt fails.
    pub fn register_violation(
        &mut self,
        kind: ViolationKind,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.fire_due(now)?;
        if self.is_running() {
            self.record_violation(kind, now)?;
        }
        Ok(())
    }

    /// Dismisses a warning notice. Returns `false` for unknown ids and for
    /// the final notice, which cannot be acknowledged.
    pub fn acknowledge_notice(&mut self, id: NoticeId) -> bool {
        match &self.notice {
            Some(notice) if notice.id == id && !notice.is_final() => {
                self.timers.cancel_notice_dismiss();
                self.dismiss_notice(id);
                true
            }
            _ => false,
        }
    }

    // ─── Answers & navigation ────────────────────────────────────────────────

    /// Records or replaces the answer to a question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuestionOutOfRange` or `SessionError::InvalidAnswer`
    /// for bad input, and `SessionError::InvalidState` outside `Running` in
    /// strict mode.
    pub fn select_answer(
        &mut self,
        question_index: usize,
        selection: AnswerSelection,
    ) -> Result<(), SessionError> {
        if !self.gate("select_answer")? {
            return Ok(());
        }
        let question = self.question_at(question_index)?;
        selection.validate_for(question)?;
        self.answers.insert(question_index, selection);
        Ok(())
    }

    /// Removes a recorded answer.
    ///
    /// # Errors
    ///
    /// Same phase and range rules as [`ProctoringSession::select_answer`].
    pub fn clear_answer(&mut self, question_index: usize) -> Result<(), SessionError> {
        if !self.gate("clear_answer")? {
            return Ok(());
        }
        self.question_at(question_index)?;
        self.answers.remove(&question_index);
        Ok(())
    }

    /// Jumps to any question.
    ///
    /// # Errors
    ///
    /// Same phase and range rules as [`ProctoringSession::select_answer`].
    pub fn navigate_to(&mut self, question_index: usize) -> Result<(), SessionError> {
        if !self.gate("navigate_to")? {
            return Ok(());
        }
        self.question_at(question_index)?;
        self.current_question = question_index;
        Ok(())
    }

    /// Moves to the next question, staying on the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Running` in strict mode.
    pub fn next_question(&mut self) -> Result<usize, SessionError> {
        if self.gate("next_question")? {
            let last = self.test.question_count().saturating_sub(1);
            self.current_question = (self.current_question + 1).min(last);
        }
        Ok(self.current_question)
    }

    /// Moves to the previous question, staying on the first one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Running` in strict mode.
    pub fn previous_question(&mut self) -> Result<usize, SessionError> {
        if self.gate("previous_question")? {
            self.current_question = self.current_question.saturating_sub(1);
        }
        Ok(self.current_question)
    }

    // ─── Persistence bookkeeping ─────────────────────────────────────────────

    pub(crate) fn set_result_id(&mut self, id: i64) {
        self.result_id = Some(id);
        self.persist_error = None;
    }

    pub(crate) fn set_persist_error(&mut self, error: String) {
        self.persist_error = Some(error);
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    /// `Ok(true)` when a user operation may proceed, `Ok(false)` when it is
    /// silently ignored.
    fn gate(&self, operation: &'static str) -> Result<bool, SessionError> {
        if self.is_running() {
            Ok(true)
        } else {
            self.reject(operation)
        }
    }

    fn reject(&self, operation: &'static str) -> Result<bool, SessionError> {
        if self.settings.strict() {
            Err(SessionError::InvalidState {
                operation,
                phase: self.phase,
            })
        } else {
            Ok(false)
        }
    }

    fn question_at(&self, index: usize) -> Result<&Question, SessionError> {
        self.test
            .question(index)
            .ok_or(SessionError::QuestionOutOfRange {
                index,
                total: self.test.question_count(),
            })
    }

    fn secs(value: u32) -> Duration {
        Duration::seconds(i64::from(value))
    }

    fn open_face_episode(&mut self, now: DateTime<Utc>) {
        self.last_face_loss_at = Some(now);
        self.face_episode_penalized = false;
        self.arm_face_grace(now);
    }

    fn arm_face_grace(&mut self, from: DateTime<Utc>) {
        self.timers
            .arm_face_grace(from + Self::secs(self.settings.face_grace_secs()));
    }

    /// Fires every deadline at or before `now`, earliest first, until none
    /// is left or the attempt completes.
    fn fire_due(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        while self.is_running() {
            let Some(due) = self.timers.take_next_due(now) else {
                break;
            };
            match due {
                Due::FaceGrace(deadline) => {
                    if self.face_present {
                        continue;
                    }
                    self.face_episode_penalized = true;
                    self.record_violation(ViolationKind::FaceNotDetected, deadline)?;
                    // A zero grace window would re-arm at the same instant forever.
                    if self.is_running()
                        && self.settings.repeat_face_violations()
                        && self.settings.face_grace_secs() > 0
                    {
                        self.arm_face_grace(deadline);
                    }
                }
                Due::NoticeDismiss(id) => self.dismiss_notice(id),
                Due::AutoSubmit(deadline) => {
                    self.finish(CompletionReason::PolicyViolation, deadline)?;
                }
            }
        }
        Ok(())
    }

    fn record_violation(
        &mut self,
        kind: ViolationKind,
        at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.violation_count = self.violation_count.saturating_add(1);
        let count = self.violation_count;
        let max = self.settings.max_warnings();
        self.violations.push(Violation {
            kind: kind.clone(),
            at,
            count,
        });
        tracing::warn!(
            test_id = %self.test.id(),
            attempt_id = %self.attempt_id,
            violation = %kind,
            count,
            max,
            "proctoring violation"
        );

        if self.timers.auto_submit_armed() {
            return Ok(());
        }

        let id = NoticeId::new(self.next_notice_id);
        self.next_notice_id += 1;

        if count >= max {
            self.show_notice(Notice::final_notice(id, kind, count, max, at));
            let delay = self.settings.auto_submit_delay_secs();
            if delay == 0 {
                return self.finish(CompletionReason::PolicyViolation, at);
            }
            self.timers.arm_auto_submit(at + Self::secs(delay));
        } else {
            let dismiss_at = (!self.settings.require_acknowledgment())
                .then(|| at + Self::secs(self.settings.notice_secs()));
            self.show_notice(Notice::warning(id, kind, count, max, at, dismiss_at));
        }
        Ok(())
    }

    fn show_notice(&mut self, notice: Notice) {
        if let Some(previous) = self.notice.take() {
            self.effects
                .push(SessionEffect::DismissNotice { id: previous.id });
        }
        self.timers.cancel_notice_dismiss();
        if let Some(at) = notice.dismiss_at {
            self.timers.arm_notice_dismiss(notice.id, at);
        }
        self.effects.push(SessionEffect::ShowNotice(notice.clone()));
        self.notice = Some(notice);
    }

    fn dismiss_notice(&mut self, id: NoticeId) {
        if self.notice.as_ref().is_some_and(|n| n.id == id) {
            self.notice = None;
            self.effects.push(SessionEffect::DismissNotice { id });
        }
    }

    fn finish(&mut self, reason: CompletionReason, at: DateTime<Utc>) -> Result<(), SessionError> {
        let started_at = self.started_at.unwrap_or(at);
        let completed_at = at.max(started_at);
        let result = AttemptResult::grade(
            self.attempt_id,
            &self.test,
            &self.answers,
            reason,
            self.violation_count,
            started_at,
            completed_at,
        )?;

        self.phase = SessionPhase::Completed;
        self.timers.clear();
        if let Some(notice) = self.notice.take() {
            self.effects
                .push(SessionEffect::DismissNotice { id: notice.id });
        }
        self.completed_at = Some(completed_at);
        self.effects.push(SessionEffect::Completed { reason });

        tracing::info!(
            test_id = %self.test.id(),
            attempt_id = %self.attempt_id,
            reason = %reason,
            score = result.score(),
            violations = self.violation_count,
            "attempt completed"
        );
        self.result = Some(result);
        Ok(())
    }
}

impl fmt::Debug for ProctoringSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProctoringSession")
            .field("attempt_id", &self.attempt_id)
            .field("test_id", &self.test.id())
            .field("phase", &self.phase)
            .field("current_question", &self.current_question)
            .field("answers_len", &self.answers.len())
            .field("remaining_secs", &self.remaining_secs)
            .field("face_present", &self.face_present)
            .field("violation_count", &self.violation_count)
            .field("completed_at", &self.completed_at)
            .field("result_id", &self.result_id)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
