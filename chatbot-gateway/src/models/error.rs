use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::gateway::GatewayError;

pub const GENERIC_INTERNAL_MESSAGE: &str = "Something went wrong!";

/// HTTP-facing error. The payload of each variant is the message the caller
/// sees, so it must already be safe to expose.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let retry_after = match &self {
            ApiError::RateLimit {
                retry_after_secs: Some(secs),
                ..
            } => Some(*secs),
            _ => None,
        };

        let message = match &self {
            ApiError::Json(e) => {
                error!("Failed to serialize response body: {}", e);
                GENERIC_INTERNAL_MESSAGE.to_string()
            },
            other => other.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { error: message })).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Decides how much failure detail reaches the caller.
///
/// Provider and internal failures always log their full detail; only
/// `InternalFailure` detail is ever echoed back, and only outside production.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPolicy {
    pub expose_details: bool,
}

impl ErrorPolicy {
    pub fn new(production: bool) -> Self {
        Self {
            expose_details: !production,
        }
    }

    pub fn to_api(&self, err: GatewayError) -> ApiError {
        match err {
            GatewayError::InvalidRequest(message) => ApiError::BadRequest(message),
            GatewayError::RateLimited { retry_after, .. } => ApiError::RateLimit {
                message: "Too many chat requests, please try again later.".to_string(),
                retry_after_secs: Some(retry_after.as_secs().max(1)),
            },
            GatewayError::NotFound => ApiError::NotFound("Project not found".to_string()),
            GatewayError::Timeout => {
                ApiError::Timeout("Request timeout. Please try again.".to_string())
            },
            GatewayError::ProviderThrottled => ApiError::RateLimit {
                message: "AI service rate limit exceeded. Please wait a moment.".to_string(),
                retry_after_secs: None,
            },
            GatewayError::ProviderFailure(_) => {
                ApiError::Internal("Failed to get AI response. Please try again.".to_string())
            },
            GatewayError::InternalFailure(detail) => {
                if self.expose_details {
                    ApiError::Internal(detail)
                } else {
                    ApiError::Internal(GENERIC_INTERNAL_MESSAGE.to_string())
                }
            },
        }
    }

    pub fn internal(&self, err: anyhow::Error) -> ApiError {
        error!("Internal failure: {:#}", err);
        self.to_api(GatewayError::InternalFailure(format!("{err:#}")))
    }
}
