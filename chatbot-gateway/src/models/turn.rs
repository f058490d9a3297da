use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One immutable entry in a project's transcript.
///
/// `sequence` and `created_at` are assigned by the transcript store at append
/// time; within a project both are non-decreasing in append order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub project_id: String,
    pub sequence: u64,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A turn that has not been appended yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub role: Role,
    pub content: String,
    pub image_url: Option<String>,
}

impl NewTurn {
    pub fn user(content: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image_url,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image_url: None,
        }
    }
}
