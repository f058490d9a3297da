use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Propagate the caller's `x-request-id`, or mint one, on request and
/// response.
pub async fn add_request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(value) = &request_id {
        req.headers_mut().insert(X_REQUEST_ID.clone(), value.clone());
    }

    let mut response = next.run(req).await;

    if let Some(value) = request_id {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }

    response
}
