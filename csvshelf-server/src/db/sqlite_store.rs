//! SQLite-backed record store
//!
//! Rows are stored as a JSON array of string arrays in `csv_records.rows`.
//! Listing order is insertion order (`rowid`).

use async_trait::async_trait;
use csvshelf_common::{time, uuid_utils};
use sqlx::{sqlite::SqliteRow, Row as _, SqlitePool};
use uuid::Uuid;

use super::record_store::{RecordStore, StoreError, StoreResult};
use crate::models::{NewRecord, RecordSummary, Row, UploadedRecord};
use crate::utils::retry_on_lock;

/// Default time budget for retrying a locked insert
pub const DEFAULT_LOCK_WAIT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    lock_wait_ms: u64,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock_wait_ms: DEFAULT_LOCK_WAIT_MS,
        }
    }

    /// Override the lock retry budget
    pub fn with_lock_wait_ms(mut self, lock_wait_ms: u64) -> Self {
        self.lock_wait_ms = lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn record_from_row(row: &SqliteRow) -> StoreResult<UploadedRecord> {
    let guid: String = row.try_get("guid")?;
    let id = uuid_utils::parse(&guid).map_err(|e| corrupt(&guid, e))?;

    let rows_json: String = row.try_get("rows")?;
    let rows: Vec<Row> = serde_json::from_str(&rows_json).map_err(|e| corrupt(&guid, e))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(UploadedRecord {
        id,
        name: row.try_get("name")?,
        rows,
        created_at: time::from_storage(&created_at).map_err(|e| corrupt(&guid, e))?,
        updated_at: time::from_storage(&updated_at).map_err(|e| corrupt(&guid, e))?,
    })
}

fn summary_from_row(row: &SqliteRow) -> StoreResult<RecordSummary> {
    let guid: String = row.try_get("guid")?;
    let row_count: i64 = row.try_get("row_count")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(RecordSummary {
        id: uuid_utils::parse(&guid).map_err(|e| corrupt(&guid, e))?,
        name: row.try_get("name")?,
        row_count: usize::try_from(row_count).map_err(|e| corrupt(&guid, e))?,
        created_at: time::from_storage(&created_at).map_err(|e| corrupt(&guid, e))?,
        updated_at: time::from_storage(&updated_at).map_err(|e| corrupt(&guid, e))?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: NewRecord) -> StoreResult<Uuid> {
        // Prepare all data before touching the pool
        let id = uuid_utils::generate();
        let guid = id.to_string();
        let rows_json = serde_json::to_string(&record.rows).map_err(|e| corrupt(&guid, e))?;
        let row_count = record.rows.len() as i64;
        let now = time::to_storage(&time::now());

        let result = retry_on_lock("insert csv record", self.lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO csv_records (guid, name, rows, row_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&guid)
            .bind(&record.name)
            .bind(&rows_json)
            .bind(row_count)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await
        })
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(id = %id, name = %record.name, row_count, "Inserted csv record");
                Ok(id)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Duplicate(record.name))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<UploadedRecord> {
        let row = sqlx::query(
            r#"
            SELECT guid, name, rows, created_at, updated_at
            FROM csv_records
            WHERE guid = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<UploadedRecord> {
        let row = sqlx::query(
            r#"
            SELECT guid, name, rows, created_at, updated_at
            FROM csv_records
            WHERE name = ?
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StoreError::NameNotFound(name.to_string())),
        }
    }

    async fn delete_by_id(&self, id: Uuid) -> StoreResult<()> {
        let guid = id.to_string();
        let result = retry_on_lock("delete csv record", self.lock_wait_ms, || async {
            sqlx::query("DELETE FROM csv_records WHERE guid = ?")
                .bind(&guid)
                .execute(&self.pool)
                .await
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        tracing::debug!(id = %id, "Deleted csv record");
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<UploadedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, name, rows, created_at, updated_at
            FROM csv_records
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn list_summaries(&self) -> StoreResult<Vec<RecordSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, name, row_count, created_at, updated_at
            FROM csv_records
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }
}
