use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Business document kinds managed by the lifecycle engine. Each kind carries
/// its own state set and transition table in [`crate::registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    WorkOrder,
    PaymentCertificate,
    Issue,
    PettyCashClaim,
    Dpr,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        Self::WorkOrder,
        Self::PaymentCertificate,
        Self::Issue,
        Self::PettyCashClaim,
        Self::Dpr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkOrder => "work_order",
            Self::PaymentCertificate => "payment_certificate",
            Self::Issue => "issue",
            Self::PettyCashClaim => "petty_cash_claim",
            Self::Dpr => "dpr",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "work_order" => Some(Self::WorkOrder),
            "payment_certificate" => Some(Self::PaymentCertificate),
            "issue" => Some(Self::Issue),
            "petty_cash_claim" => Some(Self::PettyCashClaim),
            "dpr" => Some(Self::Dpr),
            _ => None,
        }
    }

    /// URL path segment used by the `/api/v2/{resource}` routes.
    pub fn resource_slug(&self) -> &'static str {
        match self {
            Self::WorkOrder => "work-orders",
            Self::PaymentCertificate => "payment-certificates",
            Self::Issue => "issues",
            Self::PettyCashClaim => "petty-cash-claims",
            Self::Dpr => "dprs",
        }
    }

    pub fn from_resource_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entity_type| entity_type.resource_slug() == slug)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Supervisor,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supervisor" => Some(Self::Supervisor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Identity attached to every mutating call, for audit records and the
/// unlock authorization seam. Authentication itself happens upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }

    pub fn supervisor(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Supervisor)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }
}

/// The mutable "current" record of a business document.
///
/// `status` is always a member of the state set for `entity_type`; `version`
/// starts at 1 and advances exactly once per accepted transition or
/// snapshot-worthy field edit. While `locked` is set, status, version, and
/// fields are frozen until a privileged unlock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub entity_type: EntityType,
    pub entity_id: DocumentId,
    pub status: String,
    pub version: u32,
    pub locked: bool,
    /// Opaque payload owned by the calling domain; the engine stores and
    /// snapshots it but never interprets it.
    pub business_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{ActorRole, EntityType};

    #[test]
    fn entity_type_round_trips_from_storage_encoding() {
        for entity_type in EntityType::ALL {
            assert_eq!(EntityType::parse(entity_type.as_str()), Some(entity_type));
        }
    }

    #[test]
    fn entity_type_resolves_from_resource_slug() {
        for entity_type in EntityType::ALL {
            assert_eq!(
                EntityType::from_resource_slug(entity_type.resource_slug()),
                Some(entity_type),
            );
        }
        assert_eq!(EntityType::from_resource_slug("invoices"), None);
    }

    #[test]
    fn actor_role_round_trips_from_storage_encoding() {
        for role in [ActorRole::Supervisor, ActorRole::Admin] {
            assert_eq!(ActorRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ActorRole::parse("intern"), None);
    }
}
