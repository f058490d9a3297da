use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, warn};

use super::request_id::X_REQUEST_ID;

/// Log failed responses with their request id. Server errors go to `error`;
/// client errors other than 401 and 404 go to `warn`.
pub async fn log_responses(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        error!(%method, %path, %status, %request_id, elapsed_ms, "Request failed");
    } else if status.is_client_error()
        && !matches!(status, StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED)
    {
        warn!(%method, %path, %status, %request_id, elapsed_ms, "Request rejected");
    }

    response
}
