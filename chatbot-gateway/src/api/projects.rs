use axum::{
    Json,
    extract::{FromRef, OriginalUri, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    core::{
        auth::{AuthManager, CallerIdentity},
        cache::ResponseCache,
        storage::ProjectDirectory,
    },
    models::{
        error::{ApiError, ApiResult, ErrorPolicy},
        project::{NewProject, ProjectUpdate},
    },
    utils::validation::sanitize_project_name,
};

#[derive(Clone, FromRef)]
pub struct ProjectState {
    pub projects: Arc<dyn ProjectDirectory>,
    pub cache: ResponseCache,
    pub auth: Arc<AuthManager>,
    pub errors: ErrorPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

fn project_not_found() -> ApiError {
    ApiError::NotFound("Project not found".to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn create_project(
    State(state): State<ProjectState>,
    caller: CallerIdentity,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let project = NewProject {
        name: sanitize_project_name(&request.name)?,
        description: non_blank(request.description),
        system_prompt: non_blank(request.system_prompt),
    };

    let project = state
        .projects
        .create(caller.as_str(), project)
        .await
        .map_err(|e| state.errors.internal(e))?;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<ProjectState>,
    caller: CallerIdentity,
) -> ApiResult<impl IntoResponse> {
    let projects = state
        .projects
        .list_owned(caller.as_str())
        .await
        .map_err(|e| state.errors.internal(e))?;

    Ok(Json(projects))
}

/// Generic cached read; served from the cache for the default TTL once the
/// caller's ownership is confirmed.
pub async fn get_project(
    State(state): State<ProjectState>,
    caller: CallerIdentity,
    Path(project_id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<Response> {
    let project = state
        .projects
        .find_owned(&project_id, caller.as_str())
        .await
        .map_err(|e| state.errors.internal(e))?
        .ok_or_else(project_not_found)?;

    let signature = ResponseCache::signature(uri.path(), uri.query());
    if let Some(payload) = state.cache.lookup(&signature) {
        return Ok(Json(payload).into_response());
    }

    let payload = serde_json::to_value(&project)?;
    state
        .cache
        .store(signature, payload.clone(), state.cache.default_ttl());

    Ok(Json(payload).into_response())
}

/// Partial update. Changing `systemPrompt` takes effect on the next turn
/// submission; a cached `GET` may still serve the previous snapshot.
pub async fn update_project(
    State(state): State<ProjectState>,
    caller: CallerIdentity,
    Path(project_id): Path<String>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let update = ProjectUpdate {
        name: request
            .name
            .as_deref()
            .map(sanitize_project_name)
            .transpose()?,
        description: request.description.map(|d| d.trim().to_string()),
        system_prompt: request.system_prompt.map(|p| p.trim().to_string()),
    };

    let project = state
        .projects
        .update_owned(&project_id, caller.as_str(), update)
        .await
        .map_err(|e| state.errors.internal(e))?
        .ok_or_else(project_not_found)?;

    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<ProjectState>,
    caller: CallerIdentity,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state
        .projects
        .delete_owned(&project_id, caller.as_str())
        .await
        .map_err(|e| state.errors.internal(e))?;

    if !removed {
        return Err(project_not_found());
    }

    Ok(Json(DeleteResponse {
        message: "Project deleted successfully",
    }))
}
