//! The state machine's single mutation entry point.
//!
//! Every transition runs the same sequence: load, lock gate, table
//! resolution, domain precondition, atomic snapshot + advance, lifecycle
//! event. Concurrent calls against one document are serialized by the
//! store's version guard; the loser reloads and re-validates, so a replayed
//! action fails with `InvalidTransition` instead of applying twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::audit::{LifecycleEvent, LifecycleEventKind, LifecycleSink};
use crate::domain::document::{Actor, Document, DocumentId, EntityType};
use crate::errors::{EngineError, StoreError};
use crate::lock::{self, UnlockAuthorization};
use crate::registry::{self, TransitionEdge};
use crate::store::{CommitOutcome, DocumentStore};

/// Upper bound on reload-and-retry rounds after a lost version race. Under
/// table semantics the second round almost always ends in a definitive
/// accept or reject; the bound only guards against pathological churn.
const COMMIT_RETRY_LIMIT: usize = 3;

/// What a successful mutation returns to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub status: String,
    pub version: u32,
}

/// Domain veto raised by a precondition hook. The detail is surfaced
/// verbatim to the user as an actionable message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{detail}")]
pub struct PreconditionFailure {
    pub detail: String,
}

impl PreconditionFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// Domain-specific rule consulted before an edge is committed, e.g. a budget
/// headroom check before certifying a payment certificate. Hooks run under a
/// deadline and a timeout counts as failure, never as success.
#[async_trait]
pub trait PreconditionHook: Send + Sync {
    async fn check(
        &self,
        document: &Document,
        edge: &TransitionEdge,
    ) -> Result<(), PreconditionFailure>;
}

/// Hook registrations keyed per `(entity_type, action)`.
#[derive(Clone, Default)]
pub struct PreconditionSet {
    hooks: HashMap<EntityType, HashMap<String, Arc<dyn PreconditionHook>>>,
}

impl PreconditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        entity_type: EntityType,
        action: impl Into<String>,
        hook: Arc<dyn PreconditionHook>,
    ) {
        self.hooks.entry(entity_type).or_default().insert(action.into(), hook);
    }

    fn for_edge(&self, edge: &TransitionEdge) -> Option<Arc<dyn PreconditionHook>> {
        self.hooks.get(&edge.entity_type).and_then(|actions| actions.get(edge.action)).cloned()
    }
}

pub struct TransitionExecutor<S> {
    store: Arc<S>,
    preconditions: PreconditionSet,
    unlock_authorization: Arc<dyn UnlockAuthorization>,
    sink: Arc<dyn LifecycleSink>,
    precondition_deadline: Duration,
}

impl<S> TransitionExecutor<S>
where
    S: DocumentStore,
{
    pub fn new(
        store: Arc<S>,
        preconditions: PreconditionSet,
        unlock_authorization: Arc<dyn UnlockAuthorization>,
        sink: Arc<dyn LifecycleSink>,
        precondition_deadline: Duration,
    ) -> Self {
        Self { store, preconditions, unlock_authorization, sink, precondition_deadline }
    }

    /// Create a document at its type's initial status, version 1, unlocked.
    pub async fn create(
        &self,
        entity_type: EntityType,
        entity_id: DocumentId,
        business_fields: Value,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<Document, EngineError> {
        let now = Utc::now();
        let document = Document {
            entity_type,
            entity_id: entity_id.clone(),
            status: registry::initial_status(entity_type).to_string(),
            version: 1,
            locked: false,
            business_fields,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert(&document).await {
            Ok(()) => {
                self.sink.emit(
                    LifecycleEvent::new(
                        entity_type,
                        entity_id,
                        LifecycleEventKind::Created,
                        actor,
                        correlation_id,
                    )
                    .with_statuses(None::<String>, document.status.clone())
                    .with_versions(None, document.version),
                );
                Ok(document)
            }
            Err(StoreError::Conflict) => Err(EngineError::DuplicateDocument {
                entity_type,
                entity_id: entity_id.0,
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Apply a table-defined transition. Returns the new status and version,
    /// or the first applicable rejection: unknown document, locked document,
    /// illegal action, or a failed domain precondition.
    pub async fn execute(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        action: &str,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<TransitionReceipt, EngineError> {
        let result = self.execute_inner(entity_type, entity_id, action, actor, correlation_id).await;

        if let Err(error) = &result {
            if matches!(
                error,
                EngineError::InvalidTransition { .. }
                    | EngineError::LockedDocument { .. }
                    | EngineError::PreconditionFailed { .. }
            ) {
                self.sink.emit(
                    LifecycleEvent::new(
                        entity_type,
                        entity_id.clone(),
                        LifecycleEventKind::TransitionRejected,
                        actor,
                        correlation_id,
                    )
                    .with_action(action)
                    .with_detail(error.to_string()),
                );
            }
        }

        result
    }

    async fn execute_inner(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        action: &str,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<TransitionReceipt, EngineError> {
        for _ in 0..COMMIT_RETRY_LIMIT {
            let document = self.load_required(entity_type, entity_id).await?;
            lock::ensure_mutable(&document)?;
            let edge = registry::resolve(entity_type, &document.status, action)?;
            self.check_precondition(&document, edge).await?;

            let outcome = self
                .store
                .commit_change(&document, edge.to_status, &document.business_fields, edge.locks_document)
                .await?;
            match outcome {
                CommitOutcome::Committed { document: updated } => {
                    self.sink.emit(
                        LifecycleEvent::new(
                            entity_type,
                            entity_id.clone(),
                            LifecycleEventKind::Transitioned,
                            actor,
                            correlation_id,
                        )
                        .with_action(action)
                        .with_statuses(Some(document.status.clone()), updated.status.clone())
                        .with_versions(Some(document.version), updated.version),
                    );
                    return Ok(TransitionReceipt {
                        status: updated.status,
                        version: updated.version,
                    });
                }
                // Lost the version race; re-validate against the new state.
                CommitOutcome::Conflict => continue,
            }
        }

        Err(EngineError::Storage(
            "transition kept conflicting with concurrent updates".to_string(),
        ))
    }

    /// Snapshot-worthy field edit: snapshots the prior state and bumps the
    /// version without changing status. Gated by the lock policy.
    pub async fn edit(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        business_fields: Value,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<TransitionReceipt, EngineError> {
        for _ in 0..COMMIT_RETRY_LIMIT {
            let document = self.load_required(entity_type, entity_id).await?;
            lock::ensure_mutable(&document)?;

            let outcome = self
                .store
                .commit_change(&document, &document.status, &business_fields, false)
                .await?;
            match outcome {
                CommitOutcome::Committed { document: updated } => {
                    self.sink.emit(
                        LifecycleEvent::new(
                            entity_type,
                            entity_id.clone(),
                            LifecycleEventKind::FieldsEdited,
                            actor,
                            correlation_id,
                        )
                        .with_statuses(Some(document.status.clone()), updated.status.clone())
                        .with_versions(Some(document.version), updated.version),
                    );
                    return Ok(TransitionReceipt {
                        status: updated.status,
                        version: updated.version,
                    });
                }
                CommitOutcome::Conflict => continue,
            }
        }

        Err(EngineError::Storage(
            "field edit kept conflicting with concurrent updates".to_string(),
        ))
    }

    /// Privileged unlock. Not a table transition: consumes no action name,
    /// changes neither status nor version, and requires authorization from
    /// the collaborating policy.
    pub async fn unlock(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
        actor: &Actor,
        correlation_id: &str,
    ) -> Result<Document, EngineError> {
        if !self.unlock_authorization.may_unlock(actor, entity_type) {
            return Err(EngineError::UnlockDenied { actor: actor.id.clone() });
        }

        let document = self.load_required(entity_type, entity_id).await?;
        if !document.locked {
            return Ok(document);
        }

        let updated = self
            .store
            .set_locked(entity_type, entity_id, false)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound {
                entity_type,
                entity_id: entity_id.0.clone(),
            })?;

        self.sink.emit(
            LifecycleEvent::new(
                entity_type,
                entity_id.clone(),
                LifecycleEventKind::Unlocked,
                actor,
                correlation_id,
            )
            .with_statuses(Some(updated.status.clone()), updated.status.clone())
            .with_versions(Some(updated.version), updated.version),
        );

        Ok(updated)
    }

    pub async fn load_required(
        &self,
        entity_type: EntityType,
        entity_id: &DocumentId,
    ) -> Result<Document, EngineError> {
        self.store
            .load(entity_type, entity_id)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound {
                entity_type,
                entity_id: entity_id.0.clone(),
            })
    }

    async fn check_precondition(
        &self,
        document: &Document,
        edge: &TransitionEdge,
    ) -> Result<(), EngineError> {
        let Some(hook) = self.preconditions.for_edge(edge) else {
            return Ok(());
        };

        // Deadline failure closes the gate: a hook that cannot answer in
        // time must not let the transition through.
        match tokio::time::timeout(self.precondition_deadline, hook.check(document, edge)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(failure)) => Err(EngineError::PreconditionFailed { detail: failure.detail }),
            Err(_) => Err(EngineError::PreconditionFailed {
                detail: format!("precondition check for `{}` timed out", edge.action),
            }),
        }
    }
}
