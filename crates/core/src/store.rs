//! Storage seams for the lifecycle engine.
//!
//! The engine mutates documents exclusively through [`DocumentStore`] and
//! reads history through [`SnapshotStore`]. The SQL implementation lives in
//! the db crate; [`InMemoryLifecycleStore`] here backs engine unit tests and
//! any embedded use.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::document::{Document, DocumentId, EntityType};
use crate::domain::snapshot::Snapshot;
use crate::errors::StoreError;

/// Result of an atomic commit attempt. `Conflict` means the guard version no
/// longer matched the live row; the caller reloads and re-validates.
#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome {
    Committed { document: Document },
    Conflict,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// Insert a brand-new document. Returns [`StoreError::Conflict`] when a
    /// document with the same key already exists.
    async fn insert(&self, document: &Document) -> Result<(), StoreError>;

    /// Atomically snapshot `before` and advance the live row to
    /// `to_status`/`business_fields`, bumping the version by one and setting
    /// the lock flag when requested. The write is guarded by
    /// `before.version`: both the snapshot append and the row update happen
    /// in one storage transaction, or neither does.
    async fn commit_change(
        &self,
        before: &Document,
        to_status: &str,
        business_fields: &Value,
        lock: bool,
    ) -> Result<CommitOutcome, StoreError>;

    /// Flip the lock flag without touching status, version, or fields.
    /// Returns the updated document, or `None` when the document is unknown.
    async fn set_locked(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        locked: bool,
    ) -> Result<Option<Document>, StoreError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `(version, captured_at)` pairs for every stored snapshot of the
    /// document, newest first.
    async fn list_versions(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Vec<(u32, DateTime<Utc>)>, StoreError>;

    async fn get(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        version: u32,
    ) -> Result<Option<Snapshot>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    documents: HashMap<(EntityType, String), Document>,
    snapshots: BTreeMap<(EntityType, String, u32), Snapshot>,
}

/// Mutex-serialized store; the single lock makes `commit_change` atomic.
#[derive(Default)]
pub struct InMemoryLifecycleStore {
    inner: Mutex<MemoryInner>,
}

impl InMemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, operate: impl FnOnce(&mut MemoryInner) -> T) -> T {
        match self.inner.lock() {
            Ok(mut inner) => operate(&mut inner),
            Err(poisoned) => operate(&mut poisoned.into_inner()),
        }
    }

    pub fn snapshot_count(&self, entity_type: EntityType, entity_id: &DocumentId) -> usize {
        self.with_inner(|inner| {
            inner
                .snapshots
                .keys()
                .filter(|(kind, id, _)| *kind == entity_type && id == &entity_id.0)
                .count()
        })
    }
}

#[async_trait]
impl DocumentStore for InMemoryLifecycleStore {
    async fn load(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.with_inner(|inner| {
            inner.documents.get(&(entity_type, entity_id.0.clone())).cloned()
        }))
    }

    async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            let key = (document.entity_type, document.entity_id.0.clone());
            if inner.documents.contains_key(&key) {
                return Err(StoreError::Conflict);
            }
            inner.documents.insert(key, document.clone());
            Ok(())
        })
    }

    async fn commit_change(
        &self,
        before: &Document,
        to_status: &str,
        business_fields: &Value,
        lock: bool,
    ) -> Result<CommitOutcome, StoreError> {
        self.with_inner(|inner| {
            let key = (before.entity_type, before.entity_id.0.clone());
            let Some(current) = inner.documents.get(&key) else {
                return Ok(CommitOutcome::Conflict);
            };
            if current.version != before.version {
                return Ok(CommitOutcome::Conflict);
            }

            let now = Utc::now();
            let snapshot_key = (before.entity_type, before.entity_id.0.clone(), before.version);
            if inner.snapshots.contains_key(&snapshot_key) {
                return Ok(CommitOutcome::Conflict);
            }
            inner.snapshots.insert(snapshot_key, Snapshot::capture(before, now));

            let mut updated = current.clone();
            updated.status = to_status.to_string();
            updated.version = before.version + 1;
            updated.locked = lock || updated.locked;
            updated.business_fields = business_fields.clone();
            updated.updated_at = now;
            inner.documents.insert(key, updated.clone());

            Ok(CommitOutcome::Committed { document: updated })
        })
    }

    async fn set_locked(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        locked: bool,
    ) -> Result<Option<Document>, StoreError> {
        self.with_inner(|inner| {
            let key = (entity_type, entity_id.0.clone());
            let Some(document) = inner.documents.get_mut(&key) else {
                return Ok(None);
            };
            document.locked = locked;
            document.updated_at = Utc::now();
            Ok(Some(document.clone()))
        })
    }
}

#[async_trait]
impl SnapshotStore for InMemoryLifecycleStore {
    async fn list_versions(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Vec<(u32, DateTime<Utc>)>, StoreError> {
        Ok(self.with_inner(|inner| {
            let mut versions: Vec<(u32, DateTime<Utc>)> = inner
                .snapshots
                .iter()
                .filter(|((kind, id, _), _)| *kind == entity_type && id == &entity_id.0)
                .map(|((_, _, version), snapshot)| (*version, snapshot.captured_at))
                .collect();
            versions.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            versions
        }))
    }

    async fn get(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        version: u32,
    ) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.with_inner(|inner| {
            inner.snapshots.get(&(entity_type, entity_id.0.clone(), version)).cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{CommitOutcome, DocumentStore, InMemoryLifecycleStore, SnapshotStore};
    use crate::domain::document::{Document, DocumentId, EntityType};
    use crate::errors::StoreError;

    fn draft_work_order(id: &str) -> Document {
        let now = Utc::now();
        Document {
            entity_type: EntityType::WorkOrder,
            entity_id: DocumentId::new(id),
            status: "Draft".to_string(),
            version: 1,
            locked: false,
            business_fields: json!({"title": "Formwork, block A"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_keys() {
        let store = InMemoryLifecycleStore::new();
        let document = draft_work_order("WO-1");

        store.insert(&document).await.expect("first insert");
        let error = store.insert(&document).await.expect_err("duplicate insert");
        assert!(matches!(error, StoreError::Conflict));
    }

    #[tokio::test]
    async fn commit_change_snapshots_prior_state_and_advances_version() {
        let store = InMemoryLifecycleStore::new();
        let before = draft_work_order("WO-2");
        store.insert(&before).await.expect("insert");

        let outcome = store
            .commit_change(&before, "Issued", &before.business_fields, false)
            .await
            .expect("commit");
        let CommitOutcome::Committed { document } = outcome else {
            panic!("commit should succeed");
        };
        assert_eq!(document.status, "Issued");
        assert_eq!(document.version, 2);

        let snapshot = store
            .get(EntityType::WorkOrder, &before.entity_id, 1)
            .await
            .expect("query")
            .expect("snapshot at version 1");
        assert_eq!(snapshot.status, "Draft");
        assert_eq!(snapshot.business_fields, before.business_fields);
    }

    #[tokio::test]
    async fn commit_change_with_stale_version_reports_conflict() {
        let store = InMemoryLifecycleStore::new();
        let before = draft_work_order("WO-3");
        store.insert(&before).await.expect("insert");

        let first = store
            .commit_change(&before, "Issued", &before.business_fields, false)
            .await
            .expect("first commit");
        assert!(matches!(first, CommitOutcome::Committed { .. }));

        let second = store
            .commit_change(&before, "Cancelled", &before.business_fields, false)
            .await
            .expect("second commit");
        assert_eq!(second, CommitOutcome::Conflict);
        assert_eq!(store.snapshot_count(EntityType::WorkOrder, &before.entity_id), 1);
    }

    #[tokio::test]
    async fn list_versions_orders_newest_first() {
        let store = InMemoryLifecycleStore::new();
        let mut document = draft_work_order("WO-4");
        store.insert(&document).await.expect("insert");

        for status in ["Issued", "Revised"] {
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
            .list_versions(EntityType::WorkOrder, &document.entity_id)
            .await
            .expect("list")
            .into_iter()
            .map(|(version, _)| version)
            .collect();
        assert_eq!(versions, vec![2, 1]);
    }
}
