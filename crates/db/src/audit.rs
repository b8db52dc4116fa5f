//! Persistence for lifecycle audit rows.
//!
//! Audit writes are best-effort from the engine's perspective: callers log
//! failures and move on, the committed transition stands either way.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use siteline_core::audit::LifecycleEvent;
use siteline_core::domain::document::{DocumentId, EntityType};
use siteline_core::errors::StoreError;

use crate::DbPool;

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub async fn append_event(pool: &DbPool, event: &LifecycleEvent) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO transition_audit (
            id, entity_type, entity_id, kind, action, from_status, to_status,
            from_version, to_version, actor, actor_role, correlation_id, detail, occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(event.entity_type.as_str())
    .bind(&event.entity_id.0)
    .bind(kind_label(event))
    .bind(event.action.as_deref())
    .bind(event.from_status.as_deref())
    .bind(event.to_status.as_deref())
    .bind(event.from_version.map(i64::from))
    .bind(event.to_version.map(i64::from))
    .bind(&event.actor)
    .bind(&event.actor_role)
    .bind(&event.correlation_id)
    .bind(event.detail.as_deref())
    .bind(event.occurred_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(backend)?;

    Ok(())
}

/// Compact audit row view, used by operator tooling and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRow {
    pub kind: String,
    pub action: Option<String>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub actor: String,
    pub correlation_id: String,
}

pub async fn list_events(
    pool: &DbPool,
    entity_type: EntityType,
    entity_id: &DocumentId,
) -> Result<Vec<AuditRow>, StoreError> {
    let rows = sqlx::query(
        "SELECT kind, action, from_status, to_status, actor, correlation_id
         FROM transition_audit
         WHERE entity_type = ? AND entity_id = ?
         ORDER BY occurred_at ASC, id ASC",
    )
    .bind(entity_type.as_str())
    .bind(&entity_id.0)
    .fetch_all(pool)
    .await
    .map_err(backend)?;

    rows.iter().map(row_to_audit).collect()
}

fn row_to_audit(row: &SqliteRow) -> Result<AuditRow, StoreError> {
    Ok(AuditRow {
        kind: row.try_get("kind").map_err(backend)?,
        action: row.try_get("action").map_err(backend)?,
        from_status: row.try_get("from_status").map_err(backend)?,
        to_status: row.try_get("to_status").map_err(backend)?,
        actor: row.try_get("actor").map_err(backend)?,
        correlation_id: row.try_get("correlation_id").map_err(backend)?,
    })
}

fn kind_label(event: &LifecycleEvent) -> &'static str {
    use siteline_core::audit::LifecycleEventKind::*;
    match event.kind {
        Created => "created",
        Transitioned => "transitioned",
        TransitionRejected => "transition_rejected",
        FieldsEdited => "fields_edited",
        Unlocked => "unlocked",
    }
}

#[cfg(test)]
mod tests {
    use siteline_core::audit::{LifecycleEvent, LifecycleEventKind};
    use siteline_core::domain::document::{Actor, DocumentId, EntityType};

    use super::{append_event, list_events};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn appended_events_read_back_in_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let actor = Actor::supervisor("U-7");
        let id = DocumentId::new("WO-AUD-1");

        append_event(
            &pool,
            &LifecycleEvent::new(
                EntityType::WorkOrder,
                id.clone(),
                LifecycleEventKind::Created,
                &actor,
                "req-1",
            )
            .with_statuses(None::<String>, "Draft")
            .with_versions(None, 1),
        )
        .await
        .expect("append created");

        append_event(
            &pool,
            &LifecycleEvent::new(
                EntityType::WorkOrder,
                id.clone(),
                LifecycleEventKind::Transitioned,
                &actor,
                "req-2",
            )
            .with_action("issue")
            .with_statuses(Some("Draft"), "Issued")
            .with_versions(Some(1), 2),
        )
        .await
        .expect("append transitioned");

        let rows = list_events(&pool, EntityType::WorkOrder, &id).await.expect("list");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "created");
        assert_eq!(rows[1].kind, "transitioned");
        assert_eq!(rows[1].action.as_deref(), Some("issue"));
        assert_eq!(rows[1].from_status.as_deref(), Some("Draft"));
        assert_eq!(rows[1].to_status.as_deref(), Some("Issued"));

        pool.close().await;
    }
}
