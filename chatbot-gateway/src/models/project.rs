use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project owns exactly one conversation; its id doubles as the
/// conversation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

/// Partial update of a project. `None` leaves a field unchanged; an empty
/// description or system prompt clears it.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

impl ProjectUpdate {
    pub fn apply(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(system_prompt) = self.system_prompt {
            project.system_prompt = Some(system_prompt).filter(|p| !p.is_empty());
        }
    }
}
