pub mod audit;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod history;
pub mod lock;
pub mod registry;
pub mod store;

pub use audit::{
    InMemoryLifecycleSink, LifecycleEvent, LifecycleEventKind, LifecycleSink, NoopLifecycleSink,
};
pub use domain::document::{Actor, ActorRole, Document, DocumentId, EntityType};
pub use domain::snapshot::{Snapshot, VersionInfo};
pub use engine::{
    PreconditionFailure, PreconditionHook, PreconditionSet, TransitionExecutor, TransitionReceipt,
};
pub use errors::{EngineError, StoreError};
pub use history::HistoryService;
pub use lock::{AdminUnlockPolicy, UnlockAuthorization};
pub use registry::TransitionEdge;
pub use store::{CommitOutcome, DocumentStore, InMemoryLifecycleStore, SnapshotStore};

pub use chrono;
