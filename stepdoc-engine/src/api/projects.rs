//! Project endpoints

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use stepdoc_common::db::models::Project;
use uuid::Uuid;

use super::{user_id, ApiError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub title: String,
}

/// POST /api/projects
///
/// Creates a project owned by the caller and makes sure the owner has a
/// credit account.
pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let owner = user_id(&headers)?;
    let project = state.controller.create_project(&owner, &request.title).await?;
    Ok(Json(project))
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Project>, ApiError> {
    let user = user_id(&headers)?;
    let project = state.controller.get_project(&project_id, &user).await?;
    Ok(Json(project))
}
