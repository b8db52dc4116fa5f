//! Lock discipline: a locked document rejects every transition and field
//! edit until a privileged unlock clears the flag. Unlocking is not a
//! table-defined transition and never changes status on its own.

use crate::domain::document::{Actor, ActorRole, Document, EntityType};
use crate::errors::EngineError;

pub fn can_mutate(document: &Document) -> bool {
    !document.locked
}

/// Gate applied before every mutating operation. Carries the current status
/// so clients can render a locked indicator instead of retrying.
pub fn ensure_mutable(document: &Document) -> Result<(), EngineError> {
    if can_mutate(document) {
        return Ok(());
    }
    Err(EngineError::LockedDocument {
        entity_type: document.entity_type,
        entity_id: document.entity_id.0.clone(),
        status: document.status.clone(),
    })
}

/// Authorization seam for the privileged unlock operation. The real
/// decision belongs to the surrounding authorization module; the engine only
/// asks yes or no.
pub trait UnlockAuthorization: Send + Sync {
    fn may_unlock(&self, actor: &Actor, entity_type: EntityType) -> bool;
}

/// Default policy: admins may unlock anything, supervisors nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdminUnlockPolicy;

impl UnlockAuthorization for AdminUnlockPolicy {
    fn may_unlock(&self, actor: &Actor, _entity_type: EntityType) -> bool {
        actor.role == ActorRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{can_mutate, ensure_mutable, AdminUnlockPolicy, UnlockAuthorization};
    use crate::domain::document::{Actor, Document, DocumentId, EntityType};
    use crate::errors::EngineError;

    fn document(locked: bool) -> Document {
        let now = Utc::now();
        Document {
            entity_type: EntityType::PaymentCertificate,
            entity_id: DocumentId::new("PC-9"),
            status: "Fully Paid".to_string(),
            version: 4,
            locked,
            business_fields: json!({"amount": "1200.00"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unlocked_documents_are_mutable() {
        assert!(can_mutate(&document(false)));
        assert!(ensure_mutable(&document(false)).is_ok());
    }

    #[test]
    fn locked_documents_carry_status_in_the_rejection() {
        let error = ensure_mutable(&document(true)).expect_err("locked must reject");
        assert_eq!(
            error,
            EngineError::LockedDocument {
                entity_type: EntityType::PaymentCertificate,
                entity_id: "PC-9".to_string(),
                status: "Fully Paid".to_string(),
            },
        );
    }

    #[test]
    fn only_admins_pass_the_default_unlock_policy() {
        let policy = AdminUnlockPolicy;
        assert!(policy.may_unlock(&Actor::admin("U-1"), EntityType::WorkOrder));
        assert!(!policy.may_unlock(&Actor::supervisor("U-2"), EntityType::WorkOrder));
    }
}
