//! Input sanitization for user-supplied text and image references
//!
//! Messages and project names are trimmed and HTML-escaped before they are
//! stored, so transcripts can be rendered by clients verbatim.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Url;

use crate::models::error::ApiError;

/// Maximum message length, counted in characters after escaping.
pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_PROJECT_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Message too long")]
    MessageTooLong,

    #[error("Invalid project name")]
    ProjectName,

    #[error("Invalid image reference")]
    InvalidImage,
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            '\\' => escaped.push_str("&#x5C;"),
            '`' => escaped.push_str("&#96;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Trim and escape a message. Blank input is treated as absent.
pub fn sanitize_message(input: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let escaped = escape_html(trimmed);
    if escaped.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong);
    }
    Ok(Some(escaped))
}

pub fn sanitize_project_name(input: &str) -> Result<String, ValidationError> {
    let escaped = escape_html(input.trim());
    let len = escaped.chars().count();
    if len == 0 || len > MAX_PROJECT_NAME_CHARS {
        return Err(ValidationError::ProjectName);
    }
    Ok(escaped)
}

/// Accept an `http(s)` URL or a `data:<mime>;base64,<payload>` URI whose
/// payload decodes. Blank input is treated as absent.
pub fn validate_image_reference(input: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(reference) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Some(rest) = reference.strip_prefix("data:") {
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or(ValidationError::InvalidImage)?;
        if mime.is_empty() || payload.is_empty() || STANDARD.decode(payload).is_err() {
            return Err(ValidationError::InvalidImage);
        }
        return Ok(Some(reference.to_string()));
    }

    match Url::parse(reference) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            Ok(Some(reference.to_string()))
        },
        _ => Err(ValidationError::InvalidImage),
    }
}
