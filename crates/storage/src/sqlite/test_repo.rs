use chrono::Utc;
use proctor_core::model::{TestDefinition, TestId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser, test_id_from_i64};
use crate::document::TestDocument;
use crate::repository::{StorageError, TestRepository};

fn map_test_row(row: &sqlx::sqlite::SqliteRow) -> Result<TestDefinition, StorageError> {
    let id = test_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let document: String = row.try_get("document").map_err(ser)?;
    TestDocument::from_json(&document)
        .and_then(|doc| doc.into_definition(id))
        .map_err(ser)
}

#[async_trait::async_trait]
impl TestRepository for SqliteRepository {
    async fn upsert_test(&self, test: &TestDefinition) -> Result<(), StorageError> {
        let id = id_i64("test_id", test.id().value())?;
        let document = TestDocument::from_definition(test).to_json().map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO tests (id, title, status, time_limit_secs, document, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    status = excluded.status,
                    time_limit_secs = excluded.time_limit_secs,
                    document = excluded.document,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(id)
        .bind(test.title())
        .bind(test.status().as_str())
        .bind(test.time_limit_secs().map(i64::from))
        .bind(document)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_test(&self, id: TestId) -> Result<TestDefinition, StorageError> {
        let row = sqlx::query("SELECT id, document FROM tests WHERE id = ?1")
            .bind(id_i64("test_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_test_row(&row)
    }

    async fn list_tests(&self, limit: u32) -> Result<Vec<TestDefinition>, StorageError> {
        let rows = sqlx::query("SELECT id, document FROM tests ORDER BY id ASC LIMIT ?1")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_test_row).collect()
    }
}
