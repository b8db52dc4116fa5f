//! Read-only view over document history.
//!
//! The current version is always served live from the document store; only
//! versions strictly below it are backed by snapshots. History is never fed
//! back into the mutation path — there is no revert.

use std::sync::Arc;

use crate::domain::document::{DocumentId, EntityType};
use crate::domain::snapshot::{Snapshot, VersionInfo};
use crate::errors::EngineError;
use crate::store::{DocumentStore, SnapshotStore};

pub struct HistoryService<S> {
    store: Arc<S>,
}

impl<S> HistoryService<S>
where
    S: DocumentStore + SnapshotStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every version of the document, newest first. `is_current` is true
    /// only on the live version. The ordering is a display hint, not a
    /// contract.
    pub async fn list_versions(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Vec<VersionInfo>, EngineError> {
        let document = self.load_required(entity_type, entity_id).await?;

        let mut versions = vec![VersionInfo {
            version: document.version,
            created_at: document.updated_at,
            is_current: true,
        }];
        for (version, captured_at) in self.store.list_versions(entity_type, entity_id).await? {
            versions.push(VersionInfo { version, created_at: captured_at, is_current: false });
        }
        versions.sort_unstable_by(|a, b| b.version.cmp(&a.version));

        Ok(versions)
    }

    /// A historical snapshot by version. Requesting the current version
    /// fails: the live document must be read instead.
    pub async fn get_snapshot(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        version: u32,
    ) -> Result<Snapshot, EngineError> {
        let document = self.load_required(entity_type, entity_id).await?;
        if version >= document.version {
            return Err(EngineError::VersionNotFound {
                entity_type,
                entity_id: entity_id.0.clone(),
                version,
            });
        }

        self.store
            .get(entity_type, entity_id, version)
            .await?
            .ok_or(EngineError::VersionNotFound {
                entity_type,
                entity_id: entity_id.0.clone(),
                version,
            })
    }

    async fn load_required(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<crate::domain::document::Document, EngineError> {
        self.store
            .load(entity_type, entity_id)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound {
                entity_type,
                entity_id: entity_id.0.clone(),
            })
    }
}
