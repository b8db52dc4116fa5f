//! Static per-entity-type transition tables.
//!
//! These tables are the authoritative source of truth for which actions are
//! legal from which status. Clients may cache them for display, but every
//! mutation is re-validated here via [`resolve`].

use crate::domain::document::EntityType;
use crate::errors::EngineError;

/// One table-defined edge: `from_status` reaches `to_status` through the wire
/// verb `action`. Edges with `locks_document` freeze the document once taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionEdge {
    pub entity_type: EntityType,
    pub from_status: &'static str,
    pub to_status: &'static str,
    pub action: &'static str,
    pub requires_confirmation: bool,
    pub confirmation_prompt: Option<&'static str>,
    pub locks_document: bool,
}

const fn edge(
    entity_type: EntityType,
    from_status: &'static str,
    to_status: &'static str,
    action: &'static str,
) -> TransitionEdge {
    TransitionEdge {
        entity_type,
        from_status,
        to_status,
        action,
        requires_confirmation: false,
        confirmation_prompt: None,
        locks_document: false,
    }
}

const fn confirmed(
    entity_type: EntityType,
    from_status: &'static str,
    to_status: &'static str,
    action: &'static str,
    prompt: &'static str,
) -> TransitionEdge {
    TransitionEdge {
        entity_type,
        from_status,
        to_status,
        action,
        requires_confirmation: true,
        confirmation_prompt: Some(prompt),
        locks_document: false,
    }
}

const fn locking(
    entity_type: EntityType,
    from_status: &'static str,
    to_status: &'static str,
    action: &'static str,
    prompt: &'static str,
) -> TransitionEdge {
    TransitionEdge {
        entity_type,
        from_status,
        to_status,
        action,
        requires_confirmation: true,
        confirmation_prompt: Some(prompt),
        locks_document: true,
    }
}

const WORK_ORDER_EDGES: &[TransitionEdge] = &[
    edge(EntityType::WorkOrder, "Draft", "Issued", "issue"),
    confirmed(
        EntityType::WorkOrder,
        "Draft",
        "Cancelled",
        "cancel",
        "Cancel this work order? This cannot be undone.",
    ),
    edge(EntityType::WorkOrder, "Issued", "Revised", "revise"),
    confirmed(
        EntityType::WorkOrder,
        "Issued",
        "Cancelled",
        "cancel",
        "Cancel this work order? This cannot be undone.",
    ),
    confirmed(
        EntityType::WorkOrder,
        "Revised",
        "Cancelled",
        "cancel",
        "Cancel this work order? This cannot be undone.",
    ),
];

const PAYMENT_CERTIFICATE_EDGES: &[TransitionEdge] = &[
    edge(EntityType::PaymentCertificate, "Draft", "Certified", "certify"),
    edge(EntityType::PaymentCertificate, "Certified", "Partially Paid", "pay"),
    locking(
        EntityType::PaymentCertificate,
        "Certified",
        "Fully Paid",
        "mark-paid",
        "Mark this certificate fully paid? It will be locked afterwards.",
    ),
    locking(
        EntityType::PaymentCertificate,
        "Partially Paid",
        "Fully Paid",
        "mark-paid",
        "Mark this certificate fully paid? It will be locked afterwards.",
    ),
];

const ISSUE_EDGES: &[TransitionEdge] = &[
    edge(EntityType::Issue, "Open", "In Progress", "start"),
    edge(EntityType::Issue, "Open", "Closed", "close"),
    edge(EntityType::Issue, "In Progress", "Resolved", "resolve"),
    edge(EntityType::Issue, "In Progress", "Closed", "close"),
    edge(EntityType::Issue, "Resolved", "Closed", "close"),
    edge(EntityType::Issue, "Resolved", "Reopened", "reopen"),
    edge(EntityType::Issue, "Closed", "Reopened", "reopen"),
    edge(EntityType::Issue, "Reopened", "In Progress", "start"),
    edge(EntityType::Issue, "Reopened", "Closed", "close"),
];

const PETTY_CASH_CLAIM_EDGES: &[TransitionEdge] = &[
    edge(EntityType::PettyCashClaim, "Draft", "Submitted", "submit"),
    edge(EntityType::PettyCashClaim, "Submitted", "Approved", "approve"),
    confirmed(
        EntityType::PettyCashClaim,
        "Submitted",
        "Rejected",
        "reject",
        "Reject this claim? Rejection is final.",
    ),
    locking(
        EntityType::PettyCashClaim,
        "Approved",
        "Paid",
        "mark-paid",
        "Mark this claim paid? It will be locked afterwards.",
    ),
];

const DPR_EDGES: &[TransitionEdge] = &[
    edge(EntityType::Dpr, "Draft", "Submitted", "submit"),
    edge(EntityType::Dpr, "Submitted", "Approved", "approve"),
    edge(EntityType::Dpr, "Submitted", "Rejected", "reject"),
    edge(EntityType::Dpr, "Rejected", "Submitted", "submit"),
];

/// Every edge defined for `entity_type`.
pub fn edges(entity_type: EntityType) -> &'static [TransitionEdge] {
    match entity_type {
        EntityType::WorkOrder => WORK_ORDER_EDGES,
        EntityType::PaymentCertificate => PAYMENT_CERTIFICATE_EDGES,
        EntityType::Issue => ISSUE_EDGES,
        EntityType::PettyCashClaim => PETTY_CASH_CLAIM_EDGES,
        EntityType::Dpr => DPR_EDGES,
    }
}

/// The status a freshly created document of this type starts in.
pub fn initial_status(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Issue => "Open",
        EntityType::WorkOrder
        | EntityType::PaymentCertificate
        | EntityType::PettyCashClaim
        | EntityType::Dpr => "Draft",
    }
}

/// The full state set for `entity_type`, initial status first.
pub fn statuses(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::WorkOrder => &["Draft", "Issued", "Revised", "Cancelled"],
        EntityType::PaymentCertificate => &["Draft", "Certified", "Partially Paid", "Fully Paid"],
        EntityType::Issue => &["Open", "In Progress", "Resolved", "Closed", "Reopened"],
        EntityType::PettyCashClaim => &["Draft", "Submitted", "Approved", "Rejected", "Paid"],
        EntityType::Dpr => &["Draft", "Submitted", "Approved", "Rejected"],
    }
}

pub fn is_known_status(entity_type: EntityType, status: &str) -> bool {
    statuses(entity_type).contains(&status)
}

/// All edges leaving `status`. Empty for terminal statuses; never fails.
pub fn allowed_transitions(
    entity_type: EntityType,
    status: &str,
) -> Vec<&'static TransitionEdge> {
    edges(entity_type).iter().filter(|edge| edge.from_status == status).collect()
}

/// Validate that `action` is legal from `status`. The authoritative rejection
/// point for stale clients.
pub fn resolve(
    entity_type: EntityType,
    status: &str,
    action: &str,
) -> Result<&'static TransitionEdge, EngineError> {
    edges(entity_type)
        .iter()
        .find(|edge| edge.from_status == status && edge.action == action)
        .ok_or_else(|| EngineError::InvalidTransition {
            entity_type,
            status: status.to_string(),
            action: action.to_string(),
        })
}
