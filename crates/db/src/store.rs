use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use siteline_core::domain::document::{Document, DocumentId, EntityType};
use siteline_core::domain::snapshot::Snapshot;
use siteline_core::errors::StoreError;
use siteline_core::store::{CommitOutcome, DocumentStore, SnapshotStore};

use crate::DbPool;

/// SQLite-backed document and snapshot store.
///
/// `commit_change` is the engine's atomicity contract: the snapshot append
/// and the version-guarded document update run in one transaction, so a
/// crash or a lost race can never leave a version bump without its snapshot
/// or vice versa.
pub struct SqlLifecycleStore {
    pool: DbPool,
}

impl SqlLifecycleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn backend(error: sqlx::Error) -> StoreError {
        StoreError::Backend(error.to_string())
    }

    fn is_unique_violation(error: &sqlx::Error) -> bool {
        error.as_database_error().is_some_and(|db| db.is_unique_violation())
    }

    fn document_from_row(row: &SqliteRow) -> Result<Document, StoreError> {
        let entity_type_raw: String = row.try_get("entity_type").map_err(Self::backend)?;
        let entity_type = EntityType::parse(&entity_type_raw).ok_or_else(|| {
            StoreError::Decode(format!("unknown entity type `{entity_type_raw}`"))
        })?;
        let entity_id: String = row.try_get("entity_id").map_err(Self::backend)?;
        let status: String = row.try_get("status").map_err(Self::backend)?;
        let version_raw: i64 = row.try_get("version").map_err(Self::backend)?;
        let version = u32::try_from(version_raw).map_err(|_| {
            StoreError::Decode(format!("document version `{version_raw}` does not fit in u32"))
        })?;
        let locked: bool = row.try_get("locked").map_err(Self::backend)?;
        let business_fields_json: String =
            row.try_get("business_fields_json").map_err(Self::backend)?;
        let business_fields = serde_json::from_str(&business_fields_json).map_err(|error| {
            StoreError::Decode(format!("invalid business_fields_json: {error}"))
        })?;
        let created_at = Self::timestamp_from_row(row, "created_at")?;
        let updated_at = Self::timestamp_from_row(row, "updated_at")?;

        Ok(Document {
            entity_type,
            entity_id: DocumentId(entity_id),
            status,
            version,
            locked,
            business_fields,
            created_at,
            updated_at,
        })
    }

    fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot, StoreError> {
        let entity_type_raw: String = row.try_get("entity_type").map_err(Self::backend)?;
        let entity_type = EntityType::parse(&entity_type_raw).ok_or_else(|| {
            StoreError::Decode(format!("unknown entity type `{entity_type_raw}`"))
        })?;
        let entity_id: String = row.try_get("entity_id").map_err(Self::backend)?;
        let version_raw: i64 = row.try_get("version").map_err(Self::backend)?;
        let version = u32::try_from(version_raw).map_err(|_| {
            StoreError::Decode(format!("snapshot version `{version_raw}` does not fit in u32"))
        })?;
        let status: String = row.try_get("status").map_err(Self::backend)?;
        let business_fields_json: String =
            row.try_get("business_fields_json").map_err(Self::backend)?;
        let business_fields = serde_json::from_str(&business_fields_json).map_err(|error| {
            StoreError::Decode(format!("invalid business_fields_json: {error}"))
        })?;
        let captured_at = Self::timestamp_from_row(row, "captured_at")?;

        Ok(Snapshot {
            entity_type,
            entity_id: DocumentId(entity_id),
            version,
            status,
            business_fields,
            captured_at,
        })
    }

    fn timestamp_from_row(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
        let raw: String = row.try_get(column).map_err(Self::backend)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| StoreError::Decode(format!("invalid `{column}` timestamp: {error}")))
    }
}

#[async_trait]
impl DocumentStore for SqlLifecycleStore {
    async fn load(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT entity_type, entity_id, status, version, locked, business_fields_json,
                    created_at, updated_at
             FROM document
             WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(entity_type.as_str())
        .bind(&entity_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::backend)?;

        row.as_ref().map(Self::document_from_row).transpose()
    }

    async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO document (
                entity_type, entity_id, status, version, locked, business_fields_json,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.entity_type.as_str())
        .bind(&document.entity_id.0)
        .bind(&document.status)
        .bind(i64::from(document.version))
        .bind(document.locked)
        .bind(document.business_fields.to_string())
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if Self::is_unique_violation(&error) => Err(StoreError::Conflict),
            Err(error) => Err(Self::backend(error)),
        }
    }

    async fn commit_change(
        &self,
        before: &Document,
        to_status: &str,
        business_fields: &serde_json::Value,
        lock: bool,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::backend)?;
        let now = Utc::now();

        let snapshot_insert = sqlx::query(
            "INSERT INTO document_snapshot (
                entity_type, entity_id, version, status, business_fields_json, captured_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(before.entity_type.as_str())
        .bind(&before.entity_id.0)
        .bind(i64::from(before.version))
        .bind(&before.status)
        .bind(before.business_fields.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match snapshot_insert {
            Ok(_) => {}
            // A snapshot already exists at this version: another writer won
            // the race for version `before.version`. Dropping the tx rolls
            // everything back.
            Err(error) if Self::is_unique_violation(&error) => {
                return Ok(CommitOutcome::Conflict);
            }
            Err(error) => return Err(Self::backend(error)),
        }

        let locked = lock || before.locked;
        let updated = sqlx::query(
            "UPDATE document
             SET status = ?, version = version + 1, locked = ?, business_fields_json = ?,
                 updated_at = ?
             WHERE entity_type = ? AND entity_id = ? AND version = ?",
        )
        .bind(to_status)
        .bind(locked)
        .bind(business_fields.to_string())
        .bind(now.to_rfc3339())
        .bind(before.entity_type.as_str())
        .bind(&before.entity_id.0)
        .bind(i64::from(before.version))
        .execute(&mut *tx)
        .await
        .map_err(Self::backend)?;

        if updated.rows_affected() == 0 {
            return Ok(CommitOutcome::Conflict);
        }

        tx.commit().await.map_err(Self::backend)?;

        let mut document = before.clone();
        document.status = to_status.to_string();
        document.version = before.version + 1;
        document.locked = locked;
        document.business_fields = business_fields.clone();
        document.updated_at = now;
        Ok(CommitOutcome::Committed { document })
    }

    async fn set_locked(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        locked: bool,
    ) -> Result<Option<Document>, StoreError> {
        let updated = sqlx::query(
            "UPDATE document SET locked = ?, updated_at = ?
             WHERE entity_type = ? AND entity_id = ?",
        )
        .bind(locked)
        .bind(Utc::now().to_rfc3339())
        .bind(entity_type.as_str())
        .bind(&entity_id.0)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        self.load(entity_type, entity_id).await
    }
}

#[async_trait]
impl SnapshotStore for SqlLifecycleStore {
    async fn list_versions(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Vec<(u32, DateTime<Utc>)>, StoreError> {
        let rows = sqlx::query(
            "SELECT version, captured_at
             FROM document_snapshot
             WHERE entity_type = ? AND entity_id = ?
             ORDER BY version DESC",
        )
        .bind(entity_type.as_str())
        .bind(&entity_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::backend)?;

        rows.iter()
            .map(|row| {
                let version_raw: i64 = row.try_get("version").map_err(Self::backend)?;
                let version = u32::try_from(version_raw).map_err(|_| {
                    StoreError::Decode(format!(
                        "snapshot version `{version_raw}` does not fit in u32"
                    ))
                })?;
                let captured_at = Self::timestamp_from_row(row, "captured_at")?;
                Ok((version, captured_at))
            })
            .collect()
    }

    async fn get(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        version: u32,
    ) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT entity_type, entity_id, version, status, business_fields_json, captured_at
             FROM document_snapshot
             WHERE entity_type = ? AND entity_id = ? AND version = ?",
        )
        .bind(entity_type.as_str())
        .bind(&entity_id.0)
        .bind(i64::from(version))
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::backend)?;

        row.as_ref().map(Self::snapshot_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use siteline_core::domain::document::{Document, DocumentId, EntityType};
    use siteline_core::errors::StoreError;
    use siteline_core::store::{CommitOutcome, DocumentStore, SnapshotStore};

    use super::SqlLifecycleStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn certificate(id: &str) -> Document {
        let now = Utc::now();
        Document {
            entity_type: EntityType::PaymentCertificate,
            entity_id: DocumentId::new(id),
            status: "Draft".to_string(),
            version: 1,
            locked: false,
            business_fields: json!({"contractor": "Meridian Civil", "amount": "84000.00"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_then_load_round_trips_the_document() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());
        let document = certificate("PC-001");

        store.insert(&document).await.expect("insert");
        let loaded = store
            .load(EntityType::PaymentCertificate, &document.entity_id)
            .await
            .expect("load")
            .expect("document present");

        assert_eq!(loaded.status, "Draft");
        assert_eq!(loaded.version, 1);
        assert!(!loaded.locked);
        assert_eq!(loaded.business_fields, document.business_fields);

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());
        let document = certificate("PC-002");

        store.insert(&document).await.expect("first insert");
        let error = store.insert(&document).await.expect_err("duplicate insert");
        assert!(matches!(error, StoreError::Conflict));

        pool.close().await;
    }

    #[tokio::test]
    async fn commit_change_writes_snapshot_and_document_in_one_unit() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());
        let before = certificate("PC-003");
        store.insert(&before).await.expect("insert");

        let outcome = store
            .commit_change(&before, "Certified", &before.business_fields, false)
            .await
            .expect("commit");
        let CommitOutcome::Committed { document } = outcome else {
            panic!("commit should succeed");
        };
        assert_eq!(document.status, "Certified");
        assert_eq!(document.version, 2);

        let snapshot = store
            .get(EntityType::PaymentCertificate, &before.entity_id, 1)
            .await
            .expect("query")
            .expect("snapshot at version 1");
        assert_eq!(snapshot.status, "Draft");
        assert_eq!(snapshot.business_fields, before.business_fields);

        let snapshot_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_snapshot WHERE entity_id = ?")
                .bind(&before.entity_id.0)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(snapshot_count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_commit_conflicts_and_leaves_no_orphan_snapshot() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());
        let before = certificate("PC-004");
        store.insert(&before).await.expect("insert");

        let first = store
            .commit_change(&before, "Certified", &before.business_fields, false)
            .await
            .expect("first commit");
        assert!(matches!(first, CommitOutcome::Committed { .. }));

        // Same `before` again: the version guard must reject the replay.
        let second = store
            .commit_change(&before, "Certified", &before.business_fields, false)
            .await
            .expect("second commit");
        assert_eq!(second, CommitOutcome::Conflict);

        let snapshot_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_snapshot WHERE entity_id = ?")
                .bind(&before.entity_id.0)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(snapshot_count, 1);

        let version: i64 =
            sqlx::query_scalar("SELECT version FROM document WHERE entity_id = ?")
                .bind(&before.entity_id.0)
                .fetch_one(&pool)
                .await
                .expect("version");
        assert_eq!(version, 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn locking_commit_freezes_the_row() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());
        let mut document = certificate("PC-005");
        store.insert(&document).await.expect("insert");

        for (status, lock) in [("Certified", false), ("Fully Paid", true)] {
            let outcome = store
                .commit_change(&document, status, &document.business_fields, lock)
                .await
                .expect("commit");
            let CommitOutcome::Committed { document: updated } = outcome else {
                panic!("commit should succeed");
            };
            document = updated;
        }
        assert!(document.locked);
        assert_eq!(document.version, 3);

        let unlocked = store
            .set_locked(EntityType::PaymentCertificate, &document.entity_id, false)
            .await
            .expect("unlock")
            .expect("document present");
        assert!(!unlocked.locked);
        assert_eq!(unlocked.version, 3, "unlock must not bump the version");
        assert_eq!(unlocked.status, "Fully Paid");

        pool.close().await;
    }

    #[tokio::test]
    async fn set_locked_on_unknown_document_returns_none() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());

        let missing = store
            .set_locked(EntityType::WorkOrder, &DocumentId::new("WO-MISSING"), true)
            .await
            .expect("set_locked");
        assert!(missing.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn list_versions_returns_snapshots_newest_first() {
        let pool = setup_pool().await;
        let store = SqlLifecycleStore::new(pool.clone());
        let mut document = certificate("PC-006");
        store.insert(&document).await.expect("insert");

        for status in ["Certified", "Partially Paid"] {
            let outcome = store
                .commit_change(&document, status, &document.business_fields, false)
                .await
                .expect("commit");
            let CommitOutcome::Committed { document: updated } = outcome else {
                panic!("commit should succeed");
            };
            document = updated;
        }

        let versions: Vec<u32> = store
            .list_versions(EntityType::PaymentCertificate, &document.entity_id)
            .await
            .expect("list")
            .into_iter()
            .map(|(version, _)| version)
            .collect();
        assert_eq!(versions, vec![2, 1]);

        let absent = store
            .get(EntityType::PaymentCertificate, &document.entity_id, 3)
            .await
            .expect("query");
        assert!(absent.is_none(), "the current version has no snapshot row");

        pool.close().await;
    }
}
