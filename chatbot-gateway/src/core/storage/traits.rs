//! Storage trait definitions
//!
//! The gateway only talks to persistence through these traits, so the
//! in-memory backends can be swapped for a database without touching the
//! orchestration code.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::project::{NewProject, Project, ProjectUpdate};
use crate::models::turn::{NewTurn, Turn};

/// Append-only, per-project log of turns.
///
/// Implementations must be thread-safe (Send + Sync) as they will be
/// shared across multiple async tasks.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append a turn, assigning its id, sequence and timestamp
    async fn append(&self, project_id: &str, turn: NewTurn) -> Result<Turn>;

    /// The `limit` most recent turns, newest first
    async fn recent(&self, project_id: &str, limit: usize) -> Result<Vec<Turn>>;

    /// The `limit` most recent turns, oldest first
    async fn history(&self, project_id: &str, limit: usize) -> Result<Vec<Turn>>;

    /// Remove every turn of a project, returning how many were removed
    async fn clear(&self, project_id: &str) -> Result<usize>;
}

/// Lookup of projects by owner. Project CRUD proper lives outside the gateway.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn create(&self, owner_id: &str, project: NewProject) -> Result<Project>;

    /// Returns `None` both for unknown ids and for projects owned by someone else
    async fn find_owned(&self, project_id: &str, owner_id: &str) -> Result<Option<Project>>;

    /// Projects of an owner, newest first
    async fn list_owned(&self, owner_id: &str) -> Result<Vec<Project>>;

    /// Apply `update` to an owned project; `None` when unknown or foreign
    async fn update_owned(
        &self,
        project_id: &str,
        owner_id: &str,
        update: ProjectUpdate,
    ) -> Result<Option<Project>>;

    /// Returns whether an owned project was removed
    async fn delete_owned(&self, project_id: &str, owner_id: &str) -> Result<bool>;
}
