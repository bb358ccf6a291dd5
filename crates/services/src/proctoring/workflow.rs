use std::sync::Arc;

use proctor_core::model::{CompletionReason, ProctorSettings, TestId, ViolationKind};
use storage::repository::{ResultRepository, TestRepository};

use super::session::ProctoringSession;
use crate::Clock;
use crate::error::SessionError;

/// Orchestrates attempts: loads tests, stamps signals with the clock and
/// persists the result once the session completes.
///
/// Persistence never blocks completion. A failed write is logged and kept on
/// the session (`persist_error`); `finalize_result` retries it.
#[derive(Clone)]
pub struct ProctorLoopService {
    clock: Clock,
    tests: Arc<dyn TestRepository>,
    results: Arc<dyn ResultRepository>,
    settings: ProctorSettings,
}

impl ProctorLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        tests: Arc<dyn TestRepository>,
        results: Arc<dyn ResultRepository>,
    ) -> Self {
        Self {
            clock,
            tests,
            results,
            settings: ProctorSettings::standard(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ProctorSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ProctorSettings {
        &self.settings
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Load a live test and open a session for it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the test cannot be loaded and
    /// `SessionError::NotLive` if it is not accepting attempts.
    pub async fn open_attempt(&self, test_id: TestId) -> Result<ProctoringSession, SessionError> {
        let test = self.tests.get_test(test_id).await?;
        if !test.status().is_attemptable() {
            return Err(SessionError::NotLive {
                status: test.status(),
            });
        }
        Ok(ProctoringSession::new(Arc::new(test), self.settings.clone()))
    }

    /// Open and start a session in one step.
    ///
    /// # Errors
    ///
    /// Returns the errors of `open_attempt` and `ProctoringSession::start`.
    pub async fn start_attempt(&self, test_id: TestId) -> Result<ProctoringSession, SessionError> {
        let mut session = self.open_attempt(test_id).await?;
        session.start(self.clock.now())?;
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn tick(
        &self,
        session: &mut ProctoringSession,
        elapsed_secs: u32,
    ) -> Result<(), SessionError> {
        session.tick(elapsed_secs, self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn poll(&self, session: &mut ProctoringSession) -> Result<(), SessionError> {
        session.poll(self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn report_face_presence(
        &self,
        session: &mut ProctoringSession,
        present: bool,
    ) -> Result<(), SessionError> {
        session.report_face_presence(present, self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn report_visibility_change(
        &self,
        session: &mut ProctoringSession,
        hidden: bool,
    ) -> Result<(), SessionError> {
        session.report_visibility_change(hidden, self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn report_fullscreen_change(
        &self,
        session: &mut ProctoringSession,
        is_fullscreen: bool,
    ) -> Result<(), SessionError> {
        session.report_fullscreen_change(is_fullscreen, self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn report_fullscreen_unavailable(
        &self,
        session: &mut ProctoringSession,
    ) -> Result<(), SessionError> {
        session.report_fullscreen_unavailable(self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn report_page_unload(
        &self,
        session: &mut ProctoringSession,
    ) -> Result<(), SessionError> {
        session.report_page_unload(self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the signal.
    pub async fn register_violation(
        &self,
        session: &mut ProctoringSession,
        kind: ViolationKind,
    ) -> Result<(), SessionError> {
        session.register_violation(kind, self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in strict mode if the session has
    /// not started.
    pub async fn complete(
        &self,
        session: &mut ProctoringSession,
        reason: CompletionReason,
    ) -> Result<(), SessionError> {
        session.complete(reason, self.clock.now())?;
        self.persist_if_complete(session).await;
        Ok(())
    }

    /// Manual submission, persisted immediately.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` in strict mode if the session has
    /// not started.
    pub async fn submit(&self, session: &mut ProctoringSession) -> Result<(), SessionError> {
        self.complete(session, CompletionReason::ManualSubmit).await
    }

    /// Persist the result of a completed session, or return the id it was
    /// already stored under.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotComplete` if the session has not completed
    /// and `SessionError::Persistence` if the write fails.
    pub async fn finalize_result(&self, session: &mut ProctoringSession) -> Result<i64, SessionError> {
        if let Some(id) = session.result_id() {
            return Ok(id);
        }

        let result = session.result().ok_or(SessionError::NotComplete)?;
        match self.results.append_result(result).await {
            Ok(id) => {
                tracing::info!(
                    test_id = %result.test_id(),
                    attempt_id = %result.attempt_id(),
                    result_id = id,
                    "result persisted"
                );
                session.set_result_id(id);
                Ok(id)
            }
            Err(err) => {
                tracing::error!(
                    test_id = %result.test_id(),
                    attempt_id = %result.attempt_id(),
                    error = %err,
                    "result persistence failed"
                );
                session.set_persist_error(err.to_string());
                Err(SessionError::Persistence(err))
            }
        }
    }

    async fn persist_if_complete(&self, session: &mut ProctoringSession) {
        if session.is_complete() && session.result_id().is_none() && session.persist_error().is_none()
        {
            // Failures are recorded on the session for a later `finalize_result`.
            let _ = self.finalize_result(session).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proctor_core::model::{
        AnswerOption, AttemptResult, OptionId, QuestionDraft, QuestionId, QuestionKind,
        TestDefinition, TestStatus,
    };
    use proctor_core::time::fixed_now;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::repository::{InMemoryRepository, ResultRow, StorageError, TestRepository as _};

    fn build_test(status: TestStatus) -> TestDefinition {
        let question = QuestionDraft {
            id: QuestionId::new(1),
            text: "Pick A".into(),
            kind: QuestionKind::SingleSelect,
            options: vec![
                AnswerOption::new(OptionId::new(1), "A", true),
                AnswerOption::new(OptionId::new(2), "B", false),
            ],
            marks: 1,
            explanation: None,
        }
        .validate()
        .unwrap();
        TestDefinition::new(TestId::new(1), "Loop", Some(60), status, vec![question]).unwrap()
    }

    /// Fails the first `failures` writes, then delegates to memory.
    struct FlakySink {
        failures: AtomicUsize,
        calls: AtomicUsize,
        inner: InMemoryRepository,
    }

    #[async_trait]
    impl ResultRepository for FlakySink {
        async fn append_result(&self, result: &AttemptResult) -> Result<i64, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::Connection("disk unavailable".into()));
            }
            self.inner.append_result(result).await
        }

        async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError> {
            self.inner.get_result(id).await
        }

        async fn list_results(
            &self,
            test_id: TestId,
            limit: u32,
        ) -> Result<Vec<ResultRow>, StorageError> {
            self.inner.list_results(test_id, limit).await
        }
    }

    async fn service_with(sink: Arc<FlakySink>, status: TestStatus) -> ProctorLoopService {
        let repo = InMemoryRepository::new();
        repo.upsert_test(&build_test(status)).await.unwrap();
        ProctorLoopService::new(Clock::fixed(fixed_now()), Arc::new(repo), sink)
    }

    fn sink(failures: usize) -> Arc<FlakySink> {
        Arc::new(FlakySink {
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            inner: InMemoryRepository::new(),
        })
    }

    #[tokio::test]
    async fn rejects_tests_that_are_not_live() {
        let svc = service_with(sink(0), TestStatus::Published).await;
        let err = svc.open_attempt(TestId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotLive {
                status: TestStatus::Published
            }
        ));

        let err = svc.open_attempt(TestId::new(2)).await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn failed_write_is_kept_and_retried() {
        let sink = sink(1);
        let svc = service_with(sink.clone(), TestStatus::Live).await;
        let mut session = svc.start_attempt(TestId::new(1)).await.unwrap();

        svc.submit(&mut session).await.unwrap();
        assert!(session.is_complete());
        assert_eq!(session.result_id(), None);
        assert!(session.persist_error().is_some());

        // Later signals do not retry on their own.
        svc.poll(&mut session).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        let id = svc.finalize_result(&mut session).await.unwrap();
        assert_eq!(session.result_id(), Some(id));
        assert_eq!(session.persist_error(), None);
        assert_eq!(svc.finalize_result(&mut session).await.unwrap(), id);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn finalize_requires_completion() {
        let svc = service_with(sink(0), TestStatus::Live).await;
        let mut session = svc.start_attempt(TestId::new(1)).await.unwrap();
        assert!(matches!(
            svc.finalize_result(&mut session).await,
            Err(SessionError::NotComplete)
        ));
    }
}
