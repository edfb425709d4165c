//! Tracked-object API endpoints.
//!
//! Users register a small number of physical objects (keys, wallet, bag),
//! each with a name and a note, and select one before pairing a beacon to it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use searchit_core::{ObjectRegistry, TrackedObject};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the objects router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_objects).post(create_object))
        .route("/selection", delete(clear_selection))
        .route("/{id}", put(update_object))
        .route("/{id}/select", post(select_object))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Registered objects and which one is selected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "objects": [{
        "id": "01930e7a-3c2b-7d4e-9f10-2a3b4c5d6e7f",
        "name": "Keys",
        "description": "Usually on the hallway shelf"
    }],
    "selected": "01930e7a-3c2b-7d4e-9f10-2a3b4c5d6e7f",
    "max_objects": 3
}))]
pub struct ObjectListResponse {
    /// Objects in registration order.
    pub objects: Vec<TrackedObject>,

    /// Id of the selected object, if any.
    #[schema(nullable)]
    pub selected: Option<Uuid>,

    /// How many objects may be registered.
    #[schema(example = 3)]
    pub max_objects: usize,
}

/// Request to register an object.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Keys",
    "description": "Usually on the hallway shelf"
}))]
pub struct CreateObjectRequest {
    /// Display name. Must not be blank.
    #[schema(example = "Keys")]
    pub name: String,

    /// Where the object usually lives.
    #[serde(default)]
    #[schema(example = "Usually on the hallway shelf")]
    pub description: String,
}

/// Request to edit an object.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "House keys",
    "description": "Bowl by the door"
}))]
pub struct UpdateObjectRequest {
    /// New display name. Must not be blank.
    #[schema(example = "House keys")]
    pub name: String,

    /// New note. Must not be blank.
    #[schema(example = "Bowl by the door")]
    pub description: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List tracked objects.
#[utoipa::path(
    get,
    path = "/api/objects",
    tag = "objects",
    operation_id = "listObjects",
    summary = "List tracked objects",
    responses(
        (status = 200, description = "Registered objects", body = ObjectListResponse)
    )
)]
pub async fn list_objects(State(state): State<SharedState>) -> Json<ObjectListResponse> {
    let objects = state.objects();
    Json(ObjectListResponse {
        objects: objects.list(),
        selected: objects.selected_object().map(|o| o.id),
        max_objects: objects.max_objects(),
    })
}

/// Register a tracked object.
#[utoipa::path(
    post,
    path = "/api/objects",
    tag = "objects",
    operation_id = "createObject",
    summary = "Register an object",
    description = "Adds an object to the registry. Fails once the registry \
        holds the configured maximum.",
    request_body = CreateObjectRequest,
    responses(
        (status = 201, description = "Object registered", body = TrackedObject),
        (status = 400, description = "Blank name", body = super::error::ErrorResponse),
        (status = 409, description = "Registry full", body = super::error::ErrorResponse)
    )
)]
pub async fn create_object(
    State(state): State<SharedState>,
    Json(request): Json<CreateObjectRequest>,
) -> ApiResult<(StatusCode, Json<TrackedObject>)> {
    let object = state.objects().add(&request.name, &request.description)?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// Edit a tracked object.
#[utoipa::path(
    put,
    path = "/api/objects/{id}",
    tag = "objects",
    operation_id = "updateObject",
    summary = "Edit an object",
    description = "Changes an object's name and note. A beacon already paired \
        to the object keeps the details it was paired with.",
    params(("id" = Uuid, Path, description = "Object id")),
    request_body = UpdateObjectRequest,
    responses(
        (status = 200, description = "Object updated", body = TrackedObject),
        (status = 400, description = "Blank field", body = super::error::ErrorResponse),
        (status = 404, description = "Unknown object", body = super::error::ErrorResponse)
    )
)]
pub async fn update_object(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateObjectRequest>,
) -> ApiResult<Json<TrackedObject>> {
    let object = state
        .objects()
        .update(id, &request.name, &request.description)?;
    Ok(Json(object))
}

/// Select the object to pair next.
#[utoipa::path(
    post,
    path = "/api/objects/{id}/select",
    tag = "objects",
    operation_id = "selectObject",
    summary = "Select an object for pairing",
    params(("id" = Uuid, Path, description = "Object id")),
    responses(
        (status = 200, description = "Object selected", body = TrackedObject),
        (status = 404, description = "Unknown object", body = super::error::ErrorResponse)
    )
)]
pub async fn select_object(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TrackedObject>> {
    Ok(Json(state.objects().select(id)?))
}

/// Clear the selection.
#[utoipa::path(
    delete,
    path = "/api/objects/selection",
    tag = "objects",
    operation_id = "clearSelection",
    summary = "Clear the selected object",
    responses(
        (status = 204, description = "Selection cleared")
    )
)]
pub async fn clear_selection(State(state): State<SharedState>) -> StatusCode {
    state.objects().clear_selection();
    StatusCode::NO_CONTENT
}
