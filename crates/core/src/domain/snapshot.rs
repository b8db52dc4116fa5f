use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::document::{Document, DocumentId, EntityType};

/// Immutable copy of a document's state captured the moment before a
/// transition or field edit advanced it. Keyed `(entity_type, entity_id,
/// version)`; never updated or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entity_type: EntityType,
    pub entity_id: DocumentId,
    pub version: u32,
    pub status: String,
    pub business_fields: Value,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture a document exactly as it stands. Used by stores immediately
    /// before advancing the live record.
    pub fn capture(document: &Document, captured_at: DateTime<Utc>) -> Self {
        Self {
            entity_type: document.entity_type,
            entity_id: document.entity_id.clone(),
            version: document.version,
            status: document.status.clone(),
            business_fields: document.business_fields.clone(),
            captured_at,
        }
    }
}

/// One entry of a document's version listing. `is_current` is true only for
/// the live document's version; all lower versions are backed by snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}
