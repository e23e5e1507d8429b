//! Step document endpoints
//!
//! Save, submit, withdraw, load, and cross-step reference reads. All of
//! them delegate to the shared `StepController`; the handlers only shape
//! requests and responses.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{user_id, ApiError};
use crate::store::StepDocument;
use crate::submission::Acknowledgement;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveStepRequest {
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct SaveStepResponse {
    #[serde(flatten)]
    pub document: StepDocument,
    /// Whether this save created the one-time charge for the step
    pub charged: bool,
}

/// GET /api/projects/:id/steps/:step
///
/// Returns the canonical document, or JSON `null` when the step has never
/// been saved (absence is a normal state, not an error).
pub async fn get_step(
    State(state): State<AppState>,
    Path((project_id, step_number)): Path<(Uuid, i64)>,
    headers: HeaderMap,
) -> Result<Json<Option<StepDocument>>, ApiError> {
    let user = user_id(&headers)?;
    let document = state
        .controller
        .load_step(&project_id, step_number, &user)
        .await?;
    Ok(Json(document))
}

/// PUT /api/projects/:id/steps/:step
pub async fn save_step(
    State(state): State<AppState>,
    Path((project_id, step_number)): Path<(Uuid, i64)>,
    headers: HeaderMap,
    Json(request): Json<SaveStepRequest>,
) -> Result<Json<SaveStepResponse>, ApiError> {
    let user = user_id(&headers)?;
    let result = state
        .controller
        .save_step(&project_id, step_number, &user, request.payload)
        .await?;
    Ok(Json(SaveStepResponse {
        document: result.document,
        charged: result.charge.charged(),
    }))
}

/// POST /api/projects/:id/steps/:step/submit
pub async fn submit_step(
    State(state): State<AppState>,
    Path((project_id, step_number)): Path<(Uuid, i64)>,
    headers: HeaderMap,
    Json(ack): Json<Acknowledgement>,
) -> Result<Json<StepDocument>, ApiError> {
    let user = user_id(&headers)?;
    let document = state
        .controller
        .submit_step(&project_id, step_number, &user, ack)
        .await?;
    Ok(Json(document))
}

/// POST /api/projects/:id/steps/:step/withdraw
pub async fn withdraw_step(
    State(state): State<AppState>,
    Path((project_id, step_number)): Path<(Uuid, i64)>,
    headers: HeaderMap,
    Json(ack): Json<Acknowledgement>,
) -> Result<Json<StepDocument>, ApiError> {
    let user = user_id(&headers)?;
    let document = state
        .controller
        .withdraw_step(&project_id, step_number, &user, ack)
        .await?;
    Ok(Json(document))
}

/// GET /api/projects/:id/steps/:step/reference/:source
///
/// Read-only lookup of an earlier step's canonical payload, used to
/// pre-populate the step being edited. Resolves to defaults when the source
/// step has no document yet.
pub async fn get_reference(
    State(state): State<AppState>,
    Path((project_id, _step_number, source_step)): Path<(Uuid, i64, i64)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let user = user_id(&headers)?;
    let payload = state
        .controller
        .read_reference(&project_id, source_step, &user)
        .await?;
    Ok(Json(payload))
}
