use axum::{
    Json,
    extract::{FromRef, OriginalUri, Path, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::{
    core::{
        auth::{AuthManager, CallerIdentity},
        cache::ResponseCache,
        gateway::{Gateway, TurnRequest},
    },
    models::error::{ApiError, ApiResult, ErrorPolicy},
    utils::validation::{sanitize_message, validate_image_reference},
};

pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Clone, FromRef)]
pub struct ChatState {
    pub gateway: Gateway,
    pub cache: ResponseCache,
    pub auth: Arc<AuthManager>,
    pub errors: ErrorPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    pub message: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: &'static str,
}

fn cached_json(payload: serde_json::Value, hit: bool) -> Response {
    let mut response = Json(payload).into_response();
    response.headers_mut().insert(
        X_CACHE.clone(),
        HeaderValue::from_static(if hit { "HIT" } else { "MISS" }),
    );
    response
}

/// `GET /api/chat/:project_id/messages`
///
/// Ownership is checked before the cache is consulted; the cache key is the
/// request path alone.
pub async fn list_messages(
    State(state): State<ChatState>,
    caller: CallerIdentity,
    Path(project_id): Path<String>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<Response> {
    let project = state
        .gateway
        .authorize(caller.as_str(), &project_id)
        .await
        .map_err(|e| state.errors.to_api(e))?;

    let signature = ResponseCache::signature(uri.path(), uri.query());
    if let Some(payload) = state.cache.lookup(&signature) {
        debug!("Serving cached history for project {}", project.id);
        return Ok(cached_json(payload, true));
    }

    let turns = state
        .gateway
        .history(&project)
        .await
        .map_err(|e| state.errors.to_api(e))?;

    let payload = serde_json::to_value(&turns)?;
    state
        .cache
        .store(signature, payload.clone(), state.cache.history_ttl());

    Ok(cached_json(payload, false))
}

/// `POST /api/chat/:project_id/messages`
///
/// The submission runs on its own task so a client disconnect does not abort
/// the provider call or the assistant-turn write.
pub async fn post_message(
    State(state): State<ChatState>,
    caller: CallerIdentity,
    Path(project_id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let request = TurnRequest {
        message: sanitize_message(body.message.as_deref())?,
        image_url: validate_image_reference(body.image_url.as_deref())?,
    };

    let gateway = state.gateway.clone();
    let CallerIdentity(caller) = caller;
    let outcome = tokio::spawn(async move { gateway.submit(&caller, &project_id, request).await })
        .await
        .map_err(|e| state.errors.internal(anyhow::anyhow!("submission task failed: {e}")))?;

    let turn = outcome.result.map_err(|e| state.errors.to_api(e))?;
    Ok(Json(turn))
}

/// `DELETE /api/chat/:project_id/messages`
pub async fn delete_messages(
    State(state): State<ChatState>,
    caller: CallerIdentity,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .gateway
        .clear_history(caller.as_str(), &project_id)
        .await
        .map_err(|e| state.errors.to_api(e))?;

    Ok(Json(ClearResponse {
        message: "Chat history cleared",
    }))
}
