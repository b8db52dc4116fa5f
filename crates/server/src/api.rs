//! Lifecycle routes consumed by the mobile frontend.
//!
//! - `POST /api/v2/{resource}`                         — create a document
//! - `GET  /api/v2/{resource}/{id}`                    — live document (current version)
//! - `PUT  /api/v2/{resource}/{id}`                    — snapshot-worthy field edit
//! - `GET  /api/v2/{resource}/{id}/transitions`        — allowed actions from the current status
//! - `POST /api/v2/{resource}/{id}/{action}`           — invoke a table-defined transition
//! - `GET  /api/v2/{resource}/{id}/versions`           — version listing, newest first
//! - `GET  /api/v2/{resource}/{id}/snapshots/{version}`— historical snapshot
//! - `POST /api/v2/{resource}/{id}/unlock`             — privileged unlock (admin only)
//!
//! Errors carry a `detail` string: 404 unknown document/version/resource,
//! 409 invalid transition or locked document, 422 failed precondition,
//! 403 unauthorized unlock, 503 storage unavailability.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use siteline_core::domain::document::{Actor, ActorRole, DocumentId, EntityType};
use siteline_core::engine::TransitionExecutor;
use siteline_core::errors::EngineError;
use siteline_core::history::HistoryService;
use siteline_core::registry;
use siteline_db::SqlLifecycleStore;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    engine: Arc<TransitionExecutor<SqlLifecycleStore>>,
    history: Arc<HistoryService<SqlLifecycleStore>>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub entity_id: Option<String>,
    #[serde(default = "empty_fields")]
    pub business_fields: Value,
}

#[derive(Debug, Deserialize)]
pub struct EditDocumentRequest {
    pub business_fields: Value,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub status: String,
    pub version: u32,
    pub locked: bool,
    pub business_fields: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct TransitionDetail {
    pub action: &'static str,
    pub to_status: &'static str,
    pub requires_confirmation: bool,
    pub confirmation_prompt: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct TransitionsResponse {
    pub allowed_transitions: Vec<&'static str>,
    pub details: Vec<TransitionDetail>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub status: String,
    pub version: u32,
    pub allowed_transitions: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub status: String,
    pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    pub version: u32,
    pub created_at: String,
    pub is_current: bool,
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub version: u32,
    pub status: String,
    pub business_fields: Value,
    pub captured_at: String,
}

fn empty_fields() -> Value {
    Value::Object(serde_json::Map::new())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(
    engine: Arc<TransitionExecutor<SqlLifecycleStore>>,
    history: Arc<HistoryService<SqlLifecycleStore>>,
) -> Router {
    Router::new()
        .route("/api/v2/{resource}", post(create_document))
        .route("/api/v2/{resource}/{id}", get(get_document).put(edit_document))
        .route("/api/v2/{resource}/{id}/transitions", get(list_transitions))
        .route("/api/v2/{resource}/{id}/versions", get(list_versions))
        .route("/api/v2/{resource}/{id}/snapshots/{version}", get(get_snapshot))
        .route("/api/v2/{resource}/{id}/unlock", post(unlock_document))
        // Static segments (transitions, versions, unlock) win over the
        // wildcard, which keeps unlock out of the action namespace.
        .route("/api/v2/{resource}/{id}/{action}", post(invoke_transition))
        .with_state(ApiState { engine, history })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_document(
    Path(resource): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let actor = actor_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);

    let entity_id = match body.entity_id {
        Some(raw) => {
            let trimmed = raw.trim().to_string();
            if trimmed.is_empty() {
                return Err(bad_request("entity_id must not be empty"));
            }
            trimmed
        }
        None => Uuid::new_v4().simple().to_string(),
    };

    let document = state
        .engine
        .create(
            entity_type,
            DocumentId::new(entity_id),
            body.business_fields,
            &actor,
            &correlation_id,
        )
        .await
        .map_err(engine_error)?;

    info!(
        event_name = "api.document.created",
        correlation_id = %correlation_id,
        entity_type = %entity_type,
        entity_id = %document.entity_id,
        status = %document.status,
        "document created"
    );

    Ok((StatusCode::CREATED, Json(document_response(document))))
}

async fn get_document(
    Path((resource, id)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<DocumentResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let document = state
        .engine
        .load_required(entity_type, &DocumentId::new(id))
        .await
        .map_err(engine_error)?;

    Ok(Json(document_response(document)))
}

async fn edit_document(
    Path((resource, id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<EditDocumentRequest>,
) -> Result<Json<EditResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let actor = actor_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);
    let entity_id = DocumentId::new(id);

    let receipt = state
        .engine
        .edit(entity_type, &entity_id, body.business_fields, &actor, &correlation_id)
        .await
        .map_err(engine_error)?;

    info!(
        event_name = "api.document.edited",
        correlation_id = %correlation_id,
        entity_type = %entity_type,
        entity_id = %entity_id,
        version = receipt.version,
        "document fields edited"
    );

    Ok(Json(EditResponse { status: receipt.status, version: receipt.version }))
}

async fn list_transitions(
    Path((resource, id)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<TransitionsResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let document = state
        .engine
        .load_required(entity_type, &DocumentId::new(id))
        .await
        .map_err(engine_error)?;

    // A locked document offers no actions regardless of its status.
    let edges = if document.locked {
        Vec::new()
    } else {
        registry::allowed_transitions(entity_type, &document.status)
    };

    Ok(Json(TransitionsResponse {
        allowed_transitions: edges.iter().map(|edge| edge.action).collect(),
        details: edges
            .iter()
            .map(|edge| TransitionDetail {
                action: edge.action,
                to_status: edge.to_status,
                requires_confirmation: edge.requires_confirmation,
                confirmation_prompt: edge.confirmation_prompt,
            })
            .collect(),
    }))
}

async fn invoke_transition(
    Path((resource, id, action)): Path<(String, String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<TransitionResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let actor = actor_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);
    let entity_id = DocumentId::new(id);

    let receipt = state
        .engine
        .execute(entity_type, &entity_id, &action, &actor, &correlation_id)
        .await
        .map_err(engine_error)?;

    info!(
        event_name = "api.document.transitioned",
        correlation_id = %correlation_id,
        entity_type = %entity_type,
        entity_id = %entity_id,
        action = %action,
        status = %receipt.status,
        version = receipt.version,
        "transition applied"
    );

    let allowed_transitions = registry::allowed_transitions(entity_type, &receipt.status)
        .iter()
        .map(|edge| edge.action)
        .collect();

    Ok(Json(TransitionResponse {
        status: receipt.status,
        version: receipt.version,
        allowed_transitions,
    }))
}

async fn list_versions(
    Path((resource, id)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<VersionsResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let versions = state
        .history
        .list_versions(entity_type, &DocumentId::new(id))
        .await
        .map_err(engine_error)?;

    Ok(Json(VersionsResponse {
        versions: versions
            .into_iter()
            .map(|info| VersionEntry {
                version: info.version,
                created_at: info.created_at.to_rfc3339(),
                is_current: info.is_current,
            })
            .collect(),
    }))
}

async fn get_snapshot(
    Path((resource, id, version)): Path<(String, String, u32)>,
    State(state): State<ApiState>,
) -> Result<Json<SnapshotResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let snapshot = state
        .history
        .get_snapshot(entity_type, &DocumentId::new(id), version)
        .await
        .map_err(engine_error)?;

    Ok(Json(SnapshotResponse {
        entity_type: snapshot.entity_type,
        entity_id: snapshot.entity_id.0,
        version: snapshot.version,
        status: snapshot.status,
        business_fields: snapshot.business_fields,
        captured_at: snapshot.captured_at.to_rfc3339(),
    }))
}

async fn unlock_document(
    Path((resource, id)): Path<(String, String)>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<DocumentResponse>, (StatusCode, Json<ApiError>)> {
    let entity_type = resolve_resource(&resource)?;
    let actor = actor_from_headers(&headers)?;
    let correlation_id = correlation_id_from_headers(&headers);
    let entity_id = DocumentId::new(id);

    let document = state
        .engine
        .unlock(entity_type, &entity_id, &actor, &correlation_id)
        .await
        .map_err(engine_error)?;

    info!(
        event_name = "api.document.unlocked",
        correlation_id = %correlation_id,
        entity_type = %entity_type,
        entity_id = %entity_id,
        actor = %actor.id,
        "document unlocked"
    );

    Ok(Json(document_response(document)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_resource(slug: &str) -> Result<EntityType, (StatusCode, Json<ApiError>)> {
    EntityType::from_resource_slug(slug).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError { detail: format!("unknown resource `{slug}`") }),
        )
    })
}

/// Identity headers set by the upstream gateway. Authorization happens
/// there; these values feed audit records and the unlock seam.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, (StatusCode, Json<ApiError>)> {
    let id = headers
        .get("x-actor")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    let role = match headers.get("x-actor-role").and_then(|value| value.to_str().ok()) {
        Some(raw) => ActorRole::parse(raw).ok_or_else(|| {
            bad_request(format!("unknown actor role `{}` (expected supervisor|admin)", raw.trim()))
        })?,
        None => ActorRole::Supervisor,
    };

    Ok(Actor { id, role })
}

fn correlation_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

fn document_response(document: siteline_core::Document) -> DocumentResponse {
    DocumentResponse {
        entity_type: document.entity_type,
        entity_id: document.entity_id.0,
        status: document.status,
        version: document.version,
        locked: document.locked,
        business_fields: document.business_fields,
        created_at: document.created_at.to_rfc3339(),
        updated_at: document.updated_at.to_rfc3339(),
    }
}

fn bad_request(detail: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { detail: detail.into() }))
}

fn engine_error(error: EngineError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        EngineError::DocumentNotFound { .. } | EngineError::VersionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        EngineError::InvalidTransition { .. }
        | EngineError::LockedDocument { .. }
        | EngineError::DuplicateDocument { .. } => StatusCode::CONFLICT,
        EngineError::PreconditionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::UnlockDenied { .. } => StatusCode::FORBIDDEN,
        EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    if status == StatusCode::SERVICE_UNAVAILABLE {
        error!(event_name = "api.storage.error", error = %error, "storage failure behind API call");
        return (status, Json(ApiError { detail: "storage backend unavailable".to_string() }));
    }

    (status, Json(ApiError { detail: error.to_string() }))
}
