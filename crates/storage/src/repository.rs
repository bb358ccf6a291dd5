use async_trait::async_trait;
use proctor_core::model::{AttemptResult, TestDefinition, TestId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A persisted attempt result together with its storage row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: i64,
    pub result: AttemptResult,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: i64, result: AttemptResult) -> Self {
        Self { id, result }
    }
}

/// Repository contract for test definitions.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Persist or replace a test definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the test cannot be stored.
    async fn upsert_test(&self, test: &TestDefinition) -> Result<(), StorageError>;

    /// Fetch a test by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_test(&self, id: TestId) -> Result<TestDefinition, StorageError>;

    /// List stored tests ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_tests(&self, limit: u32) -> Result<Vec<TestDefinition>, StorageError>;
}

/// Write sink for completed attempts.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Append a completed attempt and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a result with the same attempt id
    /// already exists, or other storage errors.
    async fn append_result(&self, result: &AttemptResult) -> Result<i64, StorageError>;

    /// Fetch a result by row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError>;

    /// List results for a test, most recently completed first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_results(&self, test_id: TestId, limit: u32)
    -> Result<Vec<ResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tests: Arc<Mutex<HashMap<TestId, TestDefinition>>>,
    results: Arc<Mutex<Vec<ResultRow>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tests: Arc::new(Mutex::new(HashMap::new())),
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn upsert_test(&self, test: &TestDefinition) -> Result<(), StorageError> {
        let mut guard = self
            .tests
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(test.id(), test.clone());
        Ok(())
    }

    async fn get_test(&self, id: TestId) -> Result<TestDefinition, StorageError> {
        let guard = self
            .tests
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_tests(&self, limit: u32) -> Result<Vec<TestDefinition>, StorageError> {
        let guard = self
            .tests
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut tests: Vec<_> = guard.values().cloned().collect();
        tests.sort_by_key(TestDefinition::id);
        tests.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(tests)
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &AttemptResult) -> Result<i64, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard
            .iter()
            .any(|row| row.result.attempt_id() == result.attempt_id())
        {
            return Err(StorageError::Conflict);
        }
        let id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("result id overflow".into()))?
            + 1;
        guard.push(ResultRow::new(id, result.clone()));
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<AttemptResult, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.result.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(
        &self,
        test_id: TestId,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<_> = guard
            .iter()
            .filter(|row| row.result.test_id() == test_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.result
                .completed_at()
                .cmp(&a.result.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tests: Arc<dyn TestRepository>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let tests: Arc<dyn TestRepository> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo);
        Self { tests, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::model::{
        AnswerOption, AttemptId, CompletionReason, OptionId, QuestionDraft, QuestionId,
        QuestionKind, TestStatus,
    };
    use proctor_core::time::fixed_now;
    use std::collections::BTreeMap;

    fn build_test(id: u64) -> TestDefinition {
        let question = QuestionDraft {
            id: QuestionId::new(1),
            text: "Capital of France?".into(),
            kind: QuestionKind::SingleSelect,
            options: vec![
                AnswerOption::new(OptionId::new(1), "Paris", true),
                AnswerOption::new(OptionId::new(2), "Lyon", false),
            ],
            marks: 1,
            explanation: None,
        }
        .validate()
        .unwrap();
        TestDefinition::new(
            TestId::new(id),
            format!("Test {id}"),
            Some(600),
            TestStatus::Live,
            vec![question],
        )
        .unwrap()
    }

    fn build_result(test: &TestDefinition, offset_secs: i64) -> AttemptResult {
        let started = fixed_now();
        AttemptResult::grade(
            AttemptId::generate(),
            test,
            &BTreeMap::new(),
            CompletionReason::ManualSubmit,
            0,
            started,
            started + chrono::Duration::seconds(offset_secs),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn round_trips_test_definition() {
        let repo = InMemoryRepository::new();
        let test = build_test(7);
        repo.upsert_test(&test).await.unwrap();

        let fetched = repo.get_test(TestId::new(7)).await.unwrap();
        assert_eq!(fetched, test);
        assert!(matches!(
            repo.get_test(TestId::new(8)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_attempt_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let test = build_test(1);
        let result = build_result(&test, 10);

        let id = repo.append_result(&result).await.unwrap();
        assert_eq!(id, 1);
        assert!(matches!(
            repo.append_result(&result).await,
            Err(StorageError::Conflict)
        ));
        assert_eq!(repo.get_result(id).await.unwrap(), result);
    }

    #[tokio::test]
    async fn results_list_newest_first_per_test() {
        let repo = InMemoryRepository::new();
        let test = build_test(1);
        let other = build_test(2);

        repo.append_result(&build_result(&test, 10)).await.unwrap();
        repo.append_result(&build_result(&test, 30)).await.unwrap();
        repo.append_result(&build_result(&other, 20)).await.unwrap();

        let rows = repo.list_results(test.id(), 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 2);
        assert_eq!(rows[1].id, 1);
    }
}
