use thiserror::Error;

use crate::domain::document::EntityType;

/// Failure classes surfaced by the lifecycle engine.
///
/// `DocumentNotFound`/`VersionNotFound` map to 404 on the wire,
/// `InvalidTransition`/`LockedDocument`/`DuplicateDocument` to 409,
/// `PreconditionFailed` to 422, `UnlockDenied` to 403, and `Storage` to 503.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{entity_type} `{entity_id}` was not found")]
    DocumentNotFound { entity_type: EntityType, entity_id: String },
    #[error("version {version} of {entity_type} `{entity_id}` was not found")]
    VersionNotFound { entity_type: EntityType, entity_id: String, version: u32 },
    #[error("action `{action}` is not valid for {entity_type} in status `{status}`")]
    InvalidTransition { entity_type: EntityType, status: String, action: String },
    #[error("{entity_type} `{entity_id}` is locked in status `{status}`")]
    LockedDocument { entity_type: EntityType, entity_id: String, status: String },
    #[error("{entity_type} `{entity_id}` already exists")]
    DuplicateDocument { entity_type: EntityType, entity_id: String },
    #[error("{detail}")]
    PreconditionFailed { detail: String },
    #[error("actor `{actor}` is not authorized to unlock documents")]
    UnlockDenied { actor: String },
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Storage-layer failures reported by [`crate::store`] implementations.
///
/// `Conflict` is the only variant the engine handles itself: it signals a
/// lost version race (or duplicate insert) and triggers a reload-and-retry,
/// never a user-facing error on its own.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("concurrent update detected")]
    Conflict,
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}
