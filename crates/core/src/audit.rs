use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::document::{Actor, DocumentId, EntityType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Created,
    Transitioned,
    TransitionRejected,
    FieldsEdited,
    Unlocked,
}

/// One lifecycle occurrence, emitted after the storage commit (or after a
/// rejection). Consumed by audit writers and the notification dispatcher;
/// consumers must never fail the originating operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: String,
    pub entity_type: EntityType,
    pub entity_id: DocumentId,
    pub kind: LifecycleEventKind,
    pub action: Option<String>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub from_version: Option<u32>,
    pub to_version: Option<u32>,
    pub actor: String,
    pub actor_role: String,
    pub correlation_id: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(
        entity_type: EntityType,
        entity_id: DocumentId,
        kind: LifecycleEventKind,
        actor: &Actor,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            entity_type,
            entity_id,
            kind,
            action: None,
            from_status: None,
            to_status: None,
            from_version: None,
            to_version: None,
            actor: actor.id.clone(),
            actor_role: actor.role.as_str().to_string(),
            correlation_id: correlation_id.into(),
            detail: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_statuses(
        mut self,
        from_status: Option<impl Into<String>>,
        to_status: impl Into<String>,
    ) -> Self {
        self.from_status = from_status.map(Into::into);
        self.to_status = Some(to_status.into());
        self
    }

    pub fn with_versions(mut self, from_version: Option<u32>, to_version: u32) -> Self {
        self.from_version = from_version;
        self.to_version = Some(to_version);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receives lifecycle events fire-and-forget. Implementations must not block
/// the caller for long and must swallow their own failures.
pub trait LifecycleSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Sink that drops everything. Useful as a default wiring.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLifecycleSink;

impl LifecycleSink for NoopLifecycleSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryLifecycleSink {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl InMemoryLifecycleSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LifecycleSink for InMemoryLifecycleSink {
    fn emit(&self, event: LifecycleEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
