//! In-memory storage implementations
//!
//! These implementations store data in memory using thread-safe data structures.
//! Data is lost when the process exits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::project::{NewProject, Project, ProjectUpdate};
use crate::models::turn::{NewTurn, Turn};

use super::traits::{ProjectDirectory, TranscriptStore};

#[derive(Default)]
struct Transcripts {
    by_project: HashMap<String, Vec<Turn>>,
    next_sequence: u64,
}

/// In-memory implementation of TranscriptStore
///
/// Appends take the write lock, so sequence numbers and timestamps are
/// assigned in the same order turns land in the log. A timestamp never goes
/// backwards within a project even if the wall clock does.
#[derive(Default)]
pub struct InMemoryTranscriptStore {
    transcripts: RwLock<Transcripts>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(&self, project_id: &str, turn: NewTurn) -> Result<Turn> {
        let mut transcripts = self.transcripts.write();
        let sequence = transcripts.next_sequence;
        transcripts.next_sequence += 1;

        let log = transcripts
            .by_project
            .entry(project_id.to_string())
            .or_default();

        let now = Utc::now();
        let created_at = match log.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let turn = Turn {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            sequence,
            role: turn.role,
            content: turn.content,
            image_url: turn.image_url,
            created_at,
        };

        log.push(turn.clone());
        debug!(
            "Appended {} turn {} to project {}",
            turn.role.as_str(),
            turn.id,
            project_id
        );

        Ok(turn)
    }

    async fn recent(&self, project_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let transcripts = self.transcripts.read();
        Ok(transcripts
            .by_project
            .get(project_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn history(&self, project_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let transcripts = self.transcripts.read();
        Ok(transcripts
            .by_project
            .get(project_id)
            .map(|log| log[log.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default())
    }

    async fn clear(&self, project_id: &str) -> Result<usize> {
        let removed = self
            .transcripts
            .write()
            .by_project
            .remove(project_id)
            .map(|log| log.len())
            .unwrap_or(0);

        info!("Cleared {} turns from project {}", removed, project_id);
        Ok(removed)
    }
}

// ============================================================================
// InMemoryProjectDirectory
// ============================================================================

/// In-memory implementation of ProjectDirectory
///
/// Projects are kept in creation order.
#[derive(Default)]
pub struct InMemoryProjectDirectory {
    projects: RwLock<Vec<Project>>,
}

impl InMemoryProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectDirectory for InMemoryProjectDirectory {
    async fn create(&self, owner_id: &str, project: NewProject) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: project.name,
            description: project.description,
            system_prompt: project.system_prompt,
            created_at: Utc::now(),
        };

        self.projects.write().push(project.clone());
        info!("Created new project: {}", project.id);

        Ok(project)
    }

    async fn find_owned(&self, project_id: &str, owner_id: &str) -> Result<Option<Project>> {
        Ok(self
            .projects
            .read()
            .iter()
            .find(|p| p.id == project_id && p.owner_id == owner_id)
            .cloned())
    }

    async fn list_owned(&self, owner_id: &str) -> Result<Vec<Project>> {
        Ok(self
            .projects
            .read()
            .iter()
            .rev()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_owned(
        &self,
        project_id: &str,
        owner_id: &str,
        update: ProjectUpdate,
    ) -> Result<Option<Project>> {
        let mut projects = self.projects.write();
        let Some(project) = projects
            .iter_mut()
            .find(|p| p.id == project_id && p.owner_id == owner_id)
        else {
            return Ok(None);
        };

        update.apply(project);
        info!("Updated project: {}", project.id);
        Ok(Some(project.clone()))
    }

    async fn delete_owned(&self, project_id: &str, owner_id: &str) -> Result<bool> {
        let mut projects = self.projects.write();
        let before = projects.len();
        projects.retain(|p| !(p.id == project_id && p.owner_id == owner_id));

        let removed = projects.len() < before;
        if removed {
            info!("Deleted project: {}", project_id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::turn::Role;

    async fn seed(store: &InMemoryTranscriptStore, project_id: &str, count: usize) {
        for i in 0..count {
            store
                .append(project_id, NewTurn::user(format!("message {i}"), None))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_append_assigns_order() {
        let store = InMemoryTranscriptStore::new();

        let user = store
            .append("p1", NewTurn::user("Hello", None))
            .await
            .unwrap();
        let assistant = store
            .append("p1", NewTurn::assistant("Hi!"))
            .await
            .unwrap();

        assert_eq!(user.role, Role::User);
        assert_eq!(assistant.role, Role::Assistant);
        assert!(user.sequence < assistant.sequence);
        assert!(user.created_at <= assistant.created_at);
        assert_ne!(user.id, assistant.id);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_capped() {
        let store = InMemoryTranscriptStore::new();
        seed(&store, "p1", 25).await;

        let recent = store.recent("p1", 20).await.unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].content, "message 24");
        assert_eq!(recent[19].content, "message 5");
    }

    #[tokio::test]
    async fn test_history_is_ascending_most_recent() {
        let store = InMemoryTranscriptStore::new();
        seed(&store, "p1", 105).await;

        let history = store.history("p1", 100).await.unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].content, "message 5");
        assert_eq!(history[99].content, "message 104");
        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let short = store.history("p1", 1000).await.unwrap();
        assert_eq!(short.len(), 105);
    }

    #[tokio::test]
    async fn test_projects_do_not_share_transcripts() {
        let store = InMemoryTranscriptStore::new();
        seed(&store, "p1", 3).await;
        seed(&store, "p2", 2).await;

        assert_eq!(store.history("p1", 100).await.unwrap().len(), 3);
        assert_eq!(store.history("p2", 100).await.unwrap().len(), 2);
        assert!(store.history("missing", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_all_turns() {
        let store = InMemoryTranscriptStore::new();
        seed(&store, "p1", 5).await;

        assert_eq!(store.clear("p1").await.unwrap(), 5);
        assert!(store.history("p1", 100).await.unwrap().is_empty());
        assert_eq!(store.clear("p1").await.unwrap(), 0);
    }

    // ========================================================================
    // ProjectDirectory tests
    // ========================================================================

    #[tokio::test]
    async fn test_find_owned_hides_foreign_projects() {
        let directory = InMemoryProjectDirectory::new();
        let project = directory
            .create(
                "alice",
                NewProject {
                    name: "Research".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(
            directory
                .find_owned(&project.id, "alice")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            directory
                .find_owned(&project.id, "bob")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            directory
                .find_owned("nonexistent", "alice")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_list_owned_newest_first() {
        let directory = InMemoryProjectDirectory::new();
        for name in ["first", "second"] {
            directory
                .create(
                    "alice",
                    NewProject {
                        name: name.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        directory
            .create("bob", NewProject::default())
            .await
            .unwrap();

        let projects = directory.list_owned("alice").await.unwrap();
        let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_update_owned_is_partial_and_owner_scoped() {
        let directory = InMemoryProjectDirectory::new();
        let project = directory
            .create(
                "alice",
                NewProject {
                    name: "Research".to_string(),
                    description: Some("notes".to_string()),
                    system_prompt: Some("Be brief.".to_string()),
                },
            )
            .await
            .unwrap();

        let update = ProjectUpdate {
            system_prompt: Some("Answer in French.".to_string()),
            ..Default::default()
        };
        assert!(
            directory
                .update_owned(&project.id, "bob", update.clone())
                .await
                .unwrap()
                .is_none()
        );

        let updated = directory
            .update_owned(&project.id, "alice", update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Research");
        assert_eq!(updated.description.as_deref(), Some("notes"));
        assert_eq!(updated.system_prompt.as_deref(), Some("Answer in French."));

        let cleared = directory
            .update_owned(
                &project.id,
                "alice",
                ProjectUpdate {
                    description: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.description, None);
    }

    #[tokio::test]
    async fn test_delete_owned_only_removes_own_project() {
        let directory = InMemoryProjectDirectory::new();
        let project = directory
            .create("alice", NewProject::default())
            .await
            .unwrap();

        assert!(!directory.delete_owned(&project.id, "bob").await.unwrap());
        assert!(directory.delete_owned(&project.id, "alice").await.unwrap());
        assert!(!directory.delete_owned(&project.id, "alice").await.unwrap());
        assert!(
            directory
                .find_owned(&project.id, "alice")
                .await
                .unwrap()
                .is_none()
        );
    }
}
